//! 加密服务的可测属性
//!
//! 往返、非确定性、防篡改、跨盐隔离——全部不需要数据库。

use phr_system::error::AppError;
use phr_system::services::encryption_service::{EncryptedField, EncryptionService};

fn service() -> EncryptionService {
    EncryptionService::new([42u8; 32])
}

#[test]
fn test_roundtrip_for_varied_plaintexts() {
    let svc = service();
    let salt = EncryptionService::generate_user_salt();

    for plaintext in [
        "",
        "simple",
        "blood pressure 120/80 mmHg",
        "多字节字符与 emoji 🧬",
        "{\"nested\":{\"json\":[1,2,3]}}",
    ] {
        let blob = svc.encrypt(plaintext, &salt).unwrap();
        assert_eq!(svc.decrypt(&blob, &salt).unwrap(), plaintext);
    }
}

#[test]
fn test_same_plaintext_different_ciphertexts() {
    let svc = service();
    let salt = EncryptionService::generate_user_salt();

    let blob1 = svc.encrypt("cholesterol 190 mg/dL", &salt).unwrap();
    let blob2 = svc.encrypt("cholesterol 190 mg/dL", &salt).unwrap();

    // 相同明文相同盐，两次加密密文不同（不泄露相等模式）
    assert_ne!(blob1, blob2);
}

#[test]
fn test_any_bit_flip_is_detected() {
    let svc = service();
    let salt = EncryptionService::generate_user_salt();

    let blob = svc.encrypt("a1c 5.6%", &salt).unwrap();
    let field = EncryptedField::parse(&blob).unwrap();

    // 翻转密文每个字节的最低位，解密必须失败而不是返回被改动的明文
    for i in 0..field.ciphertext.len() {
        let mut tampered = field.clone();
        tampered.ciphertext[i] ^= 0x01;
        assert!(
            matches!(svc.decrypt(&tampered.encode(), &salt), Err(AppError::Decryption)),
            "bit flip at ciphertext byte {} was not detected",
            i
        );
    }

    // 标签与 IV 的篡改同样被拒绝
    let mut bad_tag = field.clone();
    bad_tag.auth_tag[0] ^= 0x01;
    assert!(matches!(
        svc.decrypt(&bad_tag.encode(), &salt),
        Err(AppError::Decryption)
    ));

    let mut bad_iv = field;
    bad_iv.iv[0] ^= 0x01;
    assert!(matches!(
        svc.decrypt(&bad_iv.encode(), &salt),
        Err(AppError::Decryption)
    ));
}

#[test]
fn test_cross_salt_decryption_fails() {
    let svc = service();
    let salt_a = EncryptionService::generate_user_salt();
    let salt_b = EncryptionService::generate_user_salt();

    let blob = svc.encrypt("patient A only", &salt_a).unwrap();

    assert!(matches!(
        svc.decrypt(&blob, &salt_b),
        Err(AppError::Decryption)
    ));
}

#[test]
fn test_different_master_keys_are_isolated() {
    let svc_a = EncryptionService::new([1u8; 32]);
    let svc_b = EncryptionService::new([2u8; 32]);
    let salt = EncryptionService::generate_user_salt();

    let blob = svc_a.encrypt("sealed under key A", &salt).unwrap();

    assert!(matches!(
        svc_b.decrypt(&blob, &salt),
        Err(AppError::Decryption)
    ));
}

#[test]
fn test_malformed_blobs_rejected_without_panic() {
    let svc = service();
    let salt = EncryptionService::generate_user_salt();

    for blob in [
        "",
        ".",
        "..",
        "onlyonesegment",
        "two.segments",
        "a.b.c.d",
        "%%%.%%%.%%%",
        "AAAA.AAAA.AAAA", // 合法 base64 但长度错误
    ] {
        assert!(matches!(
            svc.decrypt(blob, &salt),
            Err(AppError::Decryption)
        ));
    }
}

#[test]
fn test_blob_encodes_iv_ciphertext_tag() {
    let svc = service();
    let salt = EncryptionService::generate_user_salt();

    let blob = svc.encrypt("structure check", &salt).unwrap();
    let field = EncryptedField::parse(&blob).unwrap();

    assert_eq!(field.iv.len(), 12);
    assert_eq!(field.auth_tag.len(), 16);
    assert_eq!(field.encode(), blob);
}
