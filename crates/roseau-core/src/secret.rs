//! Enveloppe chiffrée autour du texte filaire.
//!
//! AES-256-CBC avec bourrage PKCS#7 : clé de 32 octets et IV de 16
//! octets tirés au hasard **par programme**, restitués en base64 avec le
//! chiffré — les trois chaînes partent ensuite comme arguments littéraux
//! du site d'appel réécrit.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;

use crate::{CoreError, CoreResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Programme scellé : clé, IV et chiffré, chacun en base64 indépendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedProgram {
    /// Clé AES (base64).
    pub key: String,
    /// Vecteur d'initialisation (base64).
    pub iv: String,
    /// Texte filaire chiffré (base64).
    pub data: String,
}

/// Chiffre le texte filaire avec une clé et un IV frais.
pub fn encrypt(plain: &str) -> SealedProgram {
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut key);
    rng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());

    SealedProgram {
        key: B64.encode(key),
        iv: B64.encode(iv),
        data: B64.encode(cipher),
    }
}

/// Déchiffre un programme scellé vers son texte filaire.
///
/// Une clé ou un IV erronés échouent (bourrage invalide ou UTF-8
/// invalide) ou produisent un texte différent — jamais silencieusement
/// le texte d'origine.
pub fn decrypt(key_b64: &str, iv_b64: &str, data_b64: &str) -> CoreResult<String> {
    let key = decode_b64("clé", key_b64)?;
    let iv = decode_b64("iv", iv_b64)?;
    let cipher = decode_b64("données", data_b64)?;

    let plain = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| CoreError::Decode("longueur de clé ou d'IV invalide".into()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&cipher)
        .map_err(|_| CoreError::Decode("bourrage invalide (clé/IV erronés ?)".into()))?;

    String::from_utf8(plain).map_err(|e| CoreError::Decode(format!("clair non UTF-8: {e}")))
}

fn decode_b64(what: &str, input: &str) -> CoreResult<Vec<u8>> {
    B64.decode(input).map_err(|e| CoreError::Decode(format!("base64 invalide ({what}): {e}")))
}

/* --------------------------------- Tests --------------------------------- */
