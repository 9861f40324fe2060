//! Pile d'opérandes.

use roseau_core::Value;

use crate::error::{VmError, VmResult};

/// Pile LIFO de valeurs, non bornée.
#[derive(Debug, Clone, Default)]
pub struct OperandStack {
    items: Vec<Value>,
}

impl OperandStack {
    /// Pile vide.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre de valeurs empilées.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Vrai si la pile est vide.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Empile une valeur.
    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    /// Dépile le sommet.
    pub fn pop(&mut self) -> VmResult<Value> {
        self.items.pop().ok_or(VmError::StackUnderflow)
    }

    /// Lit le sommet sans dépiler.
    pub fn peek(&self) -> VmResult<&Value> {
        self.items.last().ok_or(VmError::StackUnderflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lifo() {
        let mut s = OperandStack::new();
        s.push(Value::I64(1));
        s.push(Value::I64(2));
        assert_eq!(s.peek().unwrap(), &Value::I64(2));
        assert_eq!(s.pop().unwrap(), Value::I64(2));
        assert_eq!(s.pop().unwrap(), Value::I64(1));
        assert_eq!(s.pop(), Err(VmError::StackUnderflow));
        assert_eq!(s.peek(), Err(VmError::StackUnderflow));
    }
}
