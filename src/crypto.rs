//! Panel payload cipher.
//!
//! The IP module encrypts frame payloads with AES-128 in raw ECB mode:
//! no IV, no authentication tag, plaintext zero-padded to the next
//! 16-byte boundary before encryption. The key is the plain password
//! bytes at first; after the connect handshake the panel returns a
//! session key that replaces it (see [`crate::transport::Transport`]).
//!
//! This is deliberately *not* an AEAD construction like AES-GCM: the
//! panel's wire format has no room for a tag and callers rely on
//! block-for-block length symmetry between plaintext and ciphertext.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::constants::BLOCK_SIZE;

/// Zero-pad `data` up to the next multiple of [`BLOCK_SIZE`].
fn zero_pad(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    let remainder = padded.len() % BLOCK_SIZE;
    if remainder != 0 {
        padded.resize(padded.len() + (BLOCK_SIZE - remainder), 0);
    }
    padded
}

/// Build a 16-byte AES key from `key_material`, zero-padding or
/// truncating as needed. The panel password is frequently shorter than
/// 16 bytes.
fn key_block(key_material: &[u8]) -> [u8; 16] {
    let mut key = [0u8; 16];
    let n = key_material.len().min(16);
    key[..n].copy_from_slice(&key_material[..n]);
    key
}

/// Encrypt `plaintext` with AES-128-ECB under `key`.
///
/// `plaintext` is zero-padded to a 16-byte boundary first; the returned
/// ciphertext is always a multiple of 16 bytes.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(&GenericArray::from(key_block(key)));
    let mut buf = zero_pad(plaintext);

    for block in buf.chunks_mut(BLOCK_SIZE) {
        let ga = GenericArray::from_mut_slice(block);
        cipher.encrypt_block(ga);
    }

    buf
}

/// Decrypt `ciphertext` with AES-128-ECB under `key`.
///
/// `ciphertext` must already be a multiple of 16 bytes; the returned
/// plaintext is the full decrypted block stream, including any trailing
/// zero padding — callers truncate using the frame header's declared
/// logical length.
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(&GenericArray::from(key_block(key)));
    let mut buf = ciphertext.to_vec();

    for block in buf.chunks_mut(BLOCK_SIZE) {
        if block.len() < BLOCK_SIZE {
            break;
        }
        let ga = GenericArray::from_mut_slice(block);
        cipher.decrypt_block(ga);
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_short_plaintext() {
        let key = b"password";
        let plaintext = b"hello panel";
        let ciphertext = encrypt(plaintext, key);
        assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);

        let decrypted = decrypt(&ciphertext, key);
        let mut expected = plaintext.to_vec();
        expected.resize(BLOCK_SIZE, 0);
        assert_eq!(decrypted, expected);
    }

    #[test]
    fn round_trip_exact_block_multiple() {
        let key = b"sixteenbytekey!!";
        let plaintext = [0x42u8; 32];
        let ciphertext = encrypt(&plaintext, key);
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(decrypt(&ciphertext, key), plaintext.to_vec());
    }

    #[test]
    fn empty_plaintext_pads_to_one_block() {
        let key = b"k";
        let ciphertext = encrypt(b"", key);
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert_eq!(decrypt(&ciphertext, key), vec![0u8; BLOCK_SIZE]);
    }

    #[test]
    fn different_keys_produce_different_ciphertext() {
        let plaintext = b"0123456789abcdef";
        let a = encrypt(plaintext, b"keyone");
        let b = encrypt(plaintext, b"keytwo");
        assert_ne!(a, b);
    }
}
