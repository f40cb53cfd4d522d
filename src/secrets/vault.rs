//! Encrypted vault file: AES-256-GCM envelope encryption, one data key per
//! secret, wrapped by the master key from `RIVERR_MASTER_KEY`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{non_empty, SecretError, SecretSource, SecretValue};

const NONCE_LEN: usize = 12;

/// Holds the key-encryption key derived from `RIVERR_MASTER_KEY`. Every
/// secret gets its own random data key, wrapped by this one.
pub struct VaultCrypto {
    kek: Zeroizing<[u8; 32]>,
}

impl VaultCrypto {
    pub fn new(master_key_hex: &str) -> anyhow::Result<Self> {
        Ok(Self {
            kek: parse_master_key(master_key_hex)?,
        })
    }

    pub fn seal(&self, plaintext: &str) -> anyhow::Result<SealedSecret> {
        let mut dek = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut dek[..]);

        let (secret_nonce, encrypted_secret) = encrypt(&dek[..], plaintext.as_bytes())
            .context("secret encryption failed")?;
        let (dek_nonce, encrypted_dek) =
            encrypt(&self.kek[..], &dek[..]).context("data key wrapping failed")?;

        Ok(SealedSecret {
            encrypted_dek: B64.encode(encrypted_dek),
            dek_nonce: B64.encode(dek_nonce),
            encrypted_secret: B64.encode(encrypted_secret),
            secret_nonce: B64.encode(secret_nonce),
            updated_at: chrono::Utc::now(),
        })
    }

    pub fn unseal(&self, sealed: &SealedSecret) -> anyhow::Result<String> {
        let dek = Zeroizing::new(
            decrypt(
                &self.kek[..],
                &B64.decode(&sealed.dek_nonce)?,
                &B64.decode(&sealed.encrypted_dek)?,
            )
            .context("data key unwrapping failed")?,
        );
        if dek.len() != 32 {
            anyhow::bail!("data key has unexpected length {}", dek.len());
        }

        let plaintext = decrypt(
            &dek[..],
            &B64.decode(&sealed.secret_nonce)?,
            &B64.decode(&sealed.encrypted_secret)?,
        )
        .context("secret decryption failed")?;
        Ok(String::from_utf8(plaintext)?)
    }
}

fn encrypt(key: &[u8], plaintext: &[u8]) -> anyhow::Result<([u8; NONCE_LEN], Vec<u8>)> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok((nonce, ciphertext))
}

fn decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        anyhow::bail!("nonce must be {} bytes", NONCE_LEN);
    }
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow::anyhow!("{}", e))
}

pub fn parse_master_key(hex: &str) -> anyhow::Result<Zeroizing<[u8; 32]>> {
    if hex.len() != 64 {
        anyhow::bail!(
            "RIVERR_MASTER_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        );
    }
    let bytes = Zeroizing::new(hex::decode(hex).context("RIVERR_MASTER_KEY is not hex")?);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

// ── On-disk format ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedSecret {
    pub encrypted_dek: String,
    pub dek_nonce: String,
    pub encrypted_secret: String,
    pub secret_nonce: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultFile {
    pub version: u32,
    #[serde(default)]
    pub secrets: BTreeMap<String, SealedSecret>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self {
            version: 1,
            secrets: BTreeMap::new(),
        }
    }
}

impl VaultFile {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read vault file {}", path.display()))?;
        let file: VaultFile = serde_json::from_slice(&raw)
            .with_context(|| format!("vault file {} is not valid JSON", path.display()))?;
        if file.version != 1 {
            anyhow::bail!("unsupported vault file version {}", file.version);
        }
        Ok(file)
    }

    /// Loads the vault, or starts an empty one if the file does not exist yet.
    pub async fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Writes to a sibling temp file then renames over the target.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("cannot replace {}", path.display()))?;
        Ok(())
    }

    pub fn put(&mut self, crypto: &VaultCrypto, name: &str, plaintext: &str) -> anyhow::Result<()> {
        super::validate_name(name)?;
        if plaintext.is_empty() {
            anyhow::bail!("refusing to store an empty value for '{}'", name);
        }
        self.secrets.insert(name.to_string(), crypto.seal(plaintext)?);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.secrets.remove(name).is_some()
    }

    pub fn open(&self, crypto: &VaultCrypto, name: &str) -> anyhow::Result<Option<String>> {
        let Some(sealed) = self.secrets.get(name) else {
            return Ok(None);
        };
        let plaintext = crypto
            .unseal(sealed)
            .with_context(|| format!("cannot decrypt '{}'", name))?;
        Ok(Some(plaintext))
    }
}

// ── Secret source ────────────────────────────────────────────

pub struct VaultSource {
    path: PathBuf,
    crypto: VaultCrypto,
}

impl VaultSource {
    pub fn new(path: PathBuf, master_key_hex: &str) -> anyhow::Result<Self> {
        Ok(Self {
            path,
            crypto: VaultCrypto::new(master_key_hex)?,
        })
    }

    fn pick(&self, file: &VaultFile, name: &str) -> Result<SecretValue, SecretError> {
        match file.open(&self.crypto, name) {
            Ok(Some(plaintext)) => non_empty(name, plaintext),
            Ok(None) => Err(SecretError::NotFound(name.to_string())),
            Err(e) => Err(SecretError::source_failure(self.describe(), e.to_string())),
        }
    }
}

#[async_trait]
impl SecretSource for VaultSource {
    fn describe(&self) -> String {
        format!("vault:{}", self.path.display())
    }

    async fn resolve(&self, name: &str) -> Result<SecretValue, SecretError> {
        let file = VaultFile::load(&self.path)
            .await
            .map_err(|e| SecretError::source_failure(self.describe(), e.to_string()))?;
        self.pick(&file, name)
    }

    async fn resolve_many(&self, names: &[String]) -> Vec<(String, Result<SecretValue, SecretError>)> {
        match VaultFile::load(&self.path).await {
            Ok(file) => names
                .iter()
                .map(|n| (n.clone(), self.pick(&file, n)))
                .collect(),
            Err(e) => {
                let err = SecretError::source_failure(self.describe(), e.to_string());
                names.iter().map(|n| (n.clone(), Err(err.clone()))).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_sealed_secret_opens_with_same_key_only() {
        let crypto = VaultCrypto::new(MASTER_KEY).unwrap();
        let sealed = crypto.seal("sk_live_123456789").unwrap();
        assert!(!sealed.encrypted_secret.contains("sk_live"));
        assert_eq!(crypto.unseal(&sealed).unwrap(), "sk_live_123456789");

        let other = VaultCrypto::new(&"ff".repeat(32)).unwrap();
        assert!(other.unseal(&sealed).is_err());
    }

    #[test]
    fn test_tampered_secret_is_rejected() {
        let crypto = VaultCrypto::new(MASTER_KEY).unwrap();
        let mut sealed = crypto.seal("abc").unwrap();
        let mut bytes = B64.decode(&sealed.encrypted_secret).unwrap();
        bytes[0] ^= 0xff;
        sealed.encrypted_secret = B64.encode(bytes);
        assert!(crypto.unseal(&sealed).is_err());
    }

    #[test]
    fn test_master_key_must_be_64_hex_chars() {
        assert!(parse_master_key("abcd").is_err());
        assert!(parse_master_key(&"zz".repeat(32)).is_err());
    }

    #[tokio::test]
    async fn test_vault_source_resolves_saved_secrets() {
        let path = std::env::temp_dir().join(format!("riverr-vault-{}.json", uuid::Uuid::new_v4()));
        let crypto = VaultCrypto::new(MASTER_KEY).unwrap();

        let mut file = VaultFile::load_or_default(&path).await.unwrap();
        file.put(&crypto, "RADARR_KEY", "radarr-secret").unwrap();
        file.save(&path).await.unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("radarr-secret"));

        let source = VaultSource::new(path.clone(), MASTER_KEY).unwrap();
        let names = vec!["RADARR_KEY".to_string(), "SONARR_KEY".to_string()];
        let results = source.resolve_many(&names).await;
        assert_eq!(results[0].1.as_ref().unwrap().expose(), "radarr-secret");
        assert_eq!(results[1].1, Err(SecretError::NotFound("SONARR_KEY".into())));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_put_rejects_empty_values_and_bad_names() {
        let crypto = VaultCrypto::new(MASTER_KEY).unwrap();
        let mut file = VaultFile::default();
        assert!(file.put(&crypto, "KEY_A", "").is_err());
        assert!(file.put(&crypto, "bad name", "x").is_err());
        file.put(&crypto, "KEY_A", "x").unwrap();
        assert!(file.remove("KEY_A"));
        assert!(!file.remove("KEY_A"));
    }
}
