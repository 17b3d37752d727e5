//! Content encryption and key transport for XML-Enc.
//!
//! Ciphertexts follow the XML-Enc layout: CBC output is `IV || ciphertext`
//! and GCM output is `nonce || ciphertext || tag`.

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM, NONCE_LEN};
use aws_lc_rs::cipher::{
    DecryptingKey, DecryptionContext, EncryptingKey, UnboundCipherKey, AES_128, AES_192, AES_256,
};
use aws_lc_rs::iv::FixedLength;
use aws_lc_rs::rsa::{
    OaepPrivateDecryptingKey, OaepPublicEncryptingKey, Pkcs1PrivateDecryptingKey,
    Pkcs1PublicEncryptingKey, PublicEncryptingKey, OAEP_SHA1_MGF1SHA1,
};

use crate::algorithm::{BlockCipher, KeyTransport};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{Certificate, PrivateKey};
use crate::random::random_bytes;

const AES_BLOCK_LEN: usize = 16;

/// Generates a fresh content-encryption key for the cipher.
#[must_use]
pub fn generate_key(cipher: BlockCipher) -> Vec<u8> {
    random_bytes(cipher.key_len())
}

/// Encrypts content under a symmetric key.
pub fn encrypt_content(cipher: BlockCipher, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::Encryption(format!(
            "{} needs a {}-byte key",
            cipher.uri(),
            cipher.key_len()
        )));
    }
    if cipher.is_authenticated() {
        encrypt_gcm(cipher, key, plaintext)
    } else {
        encrypt_cbc(cipher, key, plaintext)
    }
}

/// Decrypts content produced by [`encrypt_content`] or another XML-Enc
/// implementation.
///
/// Every failure maps to [`CryptoError::Decryption`].
pub fn decrypt_content(cipher: BlockCipher, key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::Decryption);
    }
    if cipher.is_authenticated() {
        decrypt_gcm(cipher, key, ciphertext)
    } else {
        decrypt_cbc(cipher, key, ciphertext)
    }
}

fn cbc_algorithm(cipher: BlockCipher) -> &'static aws_lc_rs::cipher::Algorithm {
    match cipher {
        BlockCipher::Aes128Cbc | BlockCipher::Aes128Gcm => &AES_128,
        BlockCipher::Aes192Cbc => &AES_192,
        BlockCipher::Aes256Cbc | BlockCipher::Aes256Gcm => &AES_256,
    }
}

fn gcm_algorithm(cipher: BlockCipher) -> &'static aws_lc_rs::aead::Algorithm {
    match cipher {
        BlockCipher::Aes128Gcm | BlockCipher::Aes128Cbc => &AES_128_GCM,
        _ => &AES_256_GCM,
    }
}

fn encrypt_cbc(cipher: BlockCipher, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    // XML-Enc only reads the final pad byte, so PKCS#7 padding is a valid
    // ISO 10126 padding as well.
    let pad = AES_BLOCK_LEN - plaintext.len() % AES_BLOCK_LEN;
    let mut buffer = plaintext.to_vec();
    buffer.resize(plaintext.len() + pad, u8::try_from(pad).unwrap_or(16));

    let unbound = UnboundCipherKey::new(cbc_algorithm(cipher), key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let encrypting_key =
        EncryptingKey::cbc(unbound).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let context = encrypting_key
        .encrypt(&mut buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let iv: &[u8] = (&context)
        .try_into()
        .map_err(|_| CryptoError::Encryption("cipher produced no IV".to_string()))?;

    let mut output = Vec::with_capacity(iv.len() + buffer.len());
    output.extend_from_slice(iv);
    output.extend_from_slice(&buffer);
    Ok(output)
}

fn decrypt_cbc(cipher: BlockCipher, key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < 2 * AES_BLOCK_LEN || ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(CryptoError::Decryption);
    }
    let (iv, body) = ciphertext.split_at(AES_BLOCK_LEN);
    let iv: [u8; AES_BLOCK_LEN] = iv.try_into().map_err(|_| CryptoError::Decryption)?;

    let unbound =
        UnboundCipherKey::new(cbc_algorithm(cipher), key).map_err(|_| CryptoError::Decryption)?;
    let decrypting_key = DecryptingKey::cbc(unbound).map_err(|_| CryptoError::Decryption)?;
    let mut buffer = body.to_vec();
    let plaintext = decrypting_key
        .decrypt(&mut buffer, DecryptionContext::Iv128(FixedLength::from(iv)))
        .map_err(|_| CryptoError::Decryption)?;

    let pad = usize::from(*plaintext.last().ok_or(CryptoError::Decryption)?);
    if pad == 0 || pad > AES_BLOCK_LEN || pad > plaintext.len() {
        return Err(CryptoError::Decryption);
    }
    let length = plaintext.len() - pad;
    Ok(plaintext[..length].to_vec())
}

fn encrypt_gcm(cipher: BlockCipher, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let unbound = UnboundKey::new(gcm_algorithm(cipher), key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let sealing_key = LessSafeKey::new(unbound);

    let nonce_bytes = random_bytes(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let mut buffer = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut output = nonce_bytes;
    output.extend_from_slice(&buffer);
    Ok(output)
}

fn decrypt_gcm(cipher: BlockCipher, key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < NONCE_LEN {
        return Err(CryptoError::Decryption);
    }
    let (nonce, body) = ciphertext.split_at(NONCE_LEN);
    let unbound = UnboundKey::new(gcm_algorithm(cipher), key).map_err(|_| CryptoError::Decryption)?;
    let opening_key = LessSafeKey::new(unbound);
    let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| CryptoError::Decryption)?;

    let mut buffer = body.to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut buffer)
        .map_err(|_| CryptoError::Decryption)?;
    Ok(plaintext.to_vec())
}

/// Wraps a content key for the holder of the certificate.
pub fn wrap_key(transport: KeyTransport, recipient: &Certificate, key: &[u8]) -> CryptoResult<Vec<u8>> {
    let spki = recipient.subject_public_key_info()?;
    let public_key = PublicEncryptingKey::from_der(&spki)
        .map_err(|e| CryptoError::InvalidKey(format!("recipient key unusable: {e}")))?;

    match transport {
        KeyTransport::RsaOaepMgf1p => {
            let oaep = OaepPublicEncryptingKey::new(public_key)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            let mut output = vec![0u8; oaep.ciphertext_size()];
            let wrapped = oaep
                .encrypt(&OAEP_SHA1_MGF1SHA1, key, &mut output, None)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            Ok(wrapped.to_vec())
        }
        KeyTransport::Rsa15 => {
            let pkcs1 = Pkcs1PublicEncryptingKey::new(public_key)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            let mut output = vec![0u8; pkcs1.ciphertext_size()];
            let wrapped = pkcs1
                .encrypt(key, &mut output)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            Ok(wrapped.to_vec())
        }
    }
}

/// Unwraps a content key of `expected_len` bytes.
///
/// For RSA PKCS#1 v1.5 a padding failure does not surface as an error:
/// a random key of the expected length is returned instead, so a wrong key
/// and a forged ciphertext both fail later, during content decryption.
pub fn unwrap_key(
    transport: KeyTransport,
    private_key: &PrivateKey,
    wrapped: &[u8],
    expected_len: usize,
) -> CryptoResult<Vec<u8>> {
    let decrypting_key = private_key.decrypting_key()?;

    match transport {
        KeyTransport::RsaOaepMgf1p => {
            let oaep =
                OaepPrivateDecryptingKey::new(decrypting_key).map_err(|_| CryptoError::Decryption)?;
            let mut output = vec![0u8; oaep.min_output_size()];
            let key = oaep
                .decrypt(&OAEP_SHA1_MGF1SHA1, wrapped, &mut output, None)
                .map_err(|_| CryptoError::Decryption)?;
            if key.len() != expected_len {
                return Err(CryptoError::Decryption);
            }
            Ok(key.to_vec())
        }
        KeyTransport::Rsa15 => {
            let substitute = random_bytes(expected_len);
            let pkcs1 =
                Pkcs1PrivateDecryptingKey::new(decrypting_key).map_err(|_| CryptoError::Decryption)?;
            let mut output = vec![0u8; pkcs1.min_output_size()];
            match pkcs1.decrypt(wrapped, &mut output) {
                Ok(key) if key.len() == expected_len => Ok(key.to_vec()),
                _ => Ok(substitute),
            }
        }
    }
}
