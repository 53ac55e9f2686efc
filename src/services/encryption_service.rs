//! PHI 字段级加密服务
//!
//! 每用户一把派生密钥：Argon2id(主密钥, 用户盐) -> AES-256-GCM。
//! 派生是确定性的，跨请求无需缓存任何可见的密钥材料；
//! 泄露一把派生密钥不会暴露主密钥或其他用户的密钥。
//! 主密钥丢失意味着全部密文永久不可恢复，这是接受的设计属性。

use crate::{config::AppConfig, error::AppError};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{password_hash::SaltString, Algorithm, Argon2, Params, PasswordHasher, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const DERIVED_KEY_LEN: usize = 32;

/// 加密字段值类型：iv + ciphertext + authTag，编码为一个不透明字符串。
/// 只由本服务构造；其他模块只传递编码后的字符串。
#[derive(Debug, Clone)]
pub struct EncryptedField {
    pub iv: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub auth_tag: [u8; TAG_LEN],
}

impl EncryptedField {
    /// 编码为 "iv.ciphertext.tag"（三段 base64）
    pub fn encode(&self) -> String {
        format!(
            "{}.{}.{}",
            BASE64.encode(self.iv),
            BASE64.encode(&self.ciphertext),
            BASE64.encode(self.auth_tag)
        )
    }

    /// 解析编码串；任何结构性损坏都视为解密失败
    pub fn parse(blob: &str) -> Result<Self, AppError> {
        let mut parts = blob.splitn(4, '.');
        let (iv_b64, ct_b64, tag_b64) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(iv), Some(ct), Some(tag), None) => (iv, ct, tag),
            _ => return Err(AppError::Decryption),
        };

        let iv_bytes = BASE64.decode(iv_b64).map_err(|_| AppError::Decryption)?;
        let ciphertext = BASE64.decode(ct_b64).map_err(|_| AppError::Decryption)?;
        let tag_bytes = BASE64.decode(tag_b64).map_err(|_| AppError::Decryption)?;

        let iv: [u8; NONCE_LEN] = iv_bytes.try_into().map_err(|_| AppError::Decryption)?;
        let auth_tag: [u8; TAG_LEN] = tag_bytes.try_into().map_err(|_| AppError::Decryption)?;

        Ok(EncryptedField {
            iv,
            ciphertext,
            auth_tag,
        })
    }
}

/// 字段级认证加密服务。纯函数式、无内部状态，可在任意并发下共享。
pub struct EncryptionService {
    master_key: [u8; 32],
}

// 不实现 Display，Debug 不暴露密钥字节
impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    /// 从配置构造；密钥缺失或格式错误时应当阻止进程启动
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let master_key = config.master_key_bytes()?;
        Ok(Self { master_key })
    }

    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    /// 生成一个新的每用户盐（16 字节随机数的 base64 形式）。
    /// 用户创建时调用一次，随用户记录持久化。
    pub fn generate_user_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    /// 从主密钥和盐确定性派生 256 位密钥
    fn derive_key(&self, salt: &str) -> Result<[u8; DERIVED_KEY_LEN], AppError> {
        let salt = SaltString::from_b64(salt).map_err(|_| AppError::Decryption)?;

        let params = Params::new(19456, 2, 1, Some(DERIVED_KEY_LEN)).map_err(|e| {
            tracing::error!("Invalid Argon2 params: {}", e);
            AppError::Internal
        })?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let hash = argon2
            .hash_password(&self.master_key, &salt)
            .map_err(|_| AppError::Decryption)?;

        let hash_bytes = hash.hash.ok_or(AppError::Decryption)?;
        let bytes = hash_bytes.as_bytes();
        if bytes.len() < DERIVED_KEY_LEN {
            return Err(AppError::Decryption);
        }

        let mut key = [0u8; DERIVED_KEY_LEN];
        key.copy_from_slice(&bytes[..DERIVED_KEY_LEN]);
        Ok(key)
    }

    /// 认证加密一个 PHI 字符串。
    /// 每次调用使用新的随机 nonce，相同明文两次加密产生不同密文。
    /// 数值型 PHI 由调用方先转为规范字符串形式。
    pub fn encrypt(&self, plaintext: &str, salt: &str) -> Result<String, AppError> {
        let key = self.derive_key(salt).map_err(|_| {
            tracing::error!("Key derivation failed during encryption");
            AppError::Internal
        })?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| AppError::Internal)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext = cipher.encrypt(nonce, plaintext.as_bytes()).map_err(|_| {
            tracing::error!("AEAD encryption failed");
            AppError::Internal
        })?;

        // aes-gcm 将 16 字节标签追加在密文末尾，拆出来单独编码
        if ciphertext.len() < TAG_LEN {
            return Err(AppError::Internal);
        }
        let tag_start = ciphertext.len() - TAG_LEN;
        let tag_bytes = ciphertext.split_off(tag_start);
        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&tag_bytes);

        Ok(EncryptedField {
            iv: nonce_bytes,
            ciphertext,
            auth_tag,
        }
        .encode())
    }

    /// 解密并校验认证标签。
    /// 标签不匹配或密文损坏时返回 Decryption 错误，绝不返回部分明文；
    /// 失败不重试（失败意味着输入被篡改，而非瞬时故障）。
    pub fn decrypt(&self, blob: &str, salt: &str) -> Result<String, AppError> {
        let field = EncryptedField::parse(blob)?;

        let key = self.derive_key(salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| AppError::Decryption)?;

        let nonce = Nonce::from_slice(&field.iv);
        let mut sealed = field.ciphertext;
        sealed.extend_from_slice(&field.auth_tag);

        let plaintext = cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| AppError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| AppError::Decryption)
    }
}
