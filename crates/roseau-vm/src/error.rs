//! Erreurs d'exécution.
//!
//! Toutes sont **fatales à l'activation** : pas de reprise, pas de
//! résultat partiel. Une procédure virtualisée à moitié exécutée n'a pas
//! de sémantique définie.

use roseau_core::CoreError;
use thiserror::Error;

use crate::host::SymbolKind;

/// Erreurs du moteur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Texte filaire malformé ou échec de déchiffrement.
    #[error(transparent)]
    Decode(#[from] CoreError),

    /// Dépilement ou lecture d'une pile vide.
    #[error("pile d'opérandes vide")]
    StackUnderflow,

    /// Le résolveur n'a pas trouvé le symbole demandé.
    #[error("symbole introuvable: {kind} {token}")]
    UnknownSymbol {
        /// Nature du symbole demandé.
        kind: SymbolKind,
        /// Jeton numérique opaque transmis au résolveur.
        token: i64,
    },

    /// Une valeur n'a pu être convertie ni appariée à une constante
    /// énumérée du type de paramètre déclaré.
    #[error("coercition de paramètre impossible: {got} vers {expected}")]
    ParameterCoercion {
        /// Type de paramètre déclaré.
        expected: &'static str,
        /// Variant de la valeur fournie.
        got: &'static str,
    },

    /// Opérande absent ou inexploitable pour l'opcode courant.
    #[error("opérande invalide pour {opcode}: {detail}")]
    BadOperand {
        /// Opcode en cours d'exécution.
        opcode: &'static str,
        /// Description courte du problème.
        detail: String,
    },

    /// L'appel hôte lui-même a échoué.
    #[error("appel hôte: {0}")]
    Host(String),
}

/// Alias résultat du moteur.
pub type VmResult<T> = Result<T, VmError>;
