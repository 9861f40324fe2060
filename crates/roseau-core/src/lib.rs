//! roseau-core — primitives partagées du bytecode roseau
//!
//! Fournit :
//! - `Value` : valeur dynamique taguée (pile, slots, opérandes)
//! - `bytecode` : `OpCode`, `Instruction`, `Program` + codec filaire
//! - `secret` : enveloppe AES-256-CBC autour du texte filaire
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Ce crate ne contient **aucune** logique d'exécution : le moteur vit dans
//! `roseau-vm`, le traducteur dans `roseau-compiler`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use thiserror::Error;

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Instructions, opcodes, programmes et codec filaire.
pub mod bytecode;
/// Enveloppe chiffrée (clé/IV/données en base64).
pub mod secret;
/// Modèle de valeurs dynamiques.
pub mod value;

pub use bytecode::{Instruction, OpCode, Program};
pub use secret::SealedProgram;
pub use value::Value;

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Erreurs du core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Texte filaire malformé, base64/UTF-8 invalide, ou échec de
    /// déchiffrement (clé/IV erronés, bourrage invalide).
    #[error("décodage: {0}")]
    Decode(String),
}

/// Alias résultat commun au core.
pub type CoreResult<T> = Result<T, CoreError>;
