//! Tables de slots d'une activation (locaux et arguments).
//!
//! Vecteur à extension paresseuse plutôt que table de hachage : les
//! index restent explicites et la valeur par défaut (`Null`) testable.
//! Lire un slot jamais écrit rend `Null` — laxité assumée, le
//! traducteur ne lit que des slots écrits ou des arguments déclarés.

use roseau_core::Value;

/// Slots pré-alloués pour les locaux d'une activation.
const LOCAL_SLOTS: usize = 50;

/// Table indexée de slots, extensible à l'écriture.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: Vec<Value>,
}

impl SlotTable {
    /// Table de locaux : 50 slots initialisés à `Null`.
    pub fn locals() -> Self {
        Self { slots: vec![Value::Null; LOCAL_SLOTS] }
    }

    /// Table d'arguments, peuplée 1:1 depuis le vecteur de l'appelant.
    pub fn args(values: Vec<Value>) -> Self {
        Self { slots: values }
    }

    /// Nombre de slots occupés.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Vrai si aucun slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lit le slot `index` ; `Null` si jamais écrit.
    pub fn get(&self, index: usize) -> Value {
        self.slots.get(index).cloned().unwrap_or_default()
    }

    /// Écrit le slot `index`, en étendant la table au besoin.
    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Value::Null);
        }
        self.slots[index] = value;
    }
}
