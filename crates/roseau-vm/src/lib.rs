//! roseau-vm — moteur d'exécution des procédures virtualisées.
//!
//! Machine à pile dynamiquement typée : une activation par invocation
//! (pile d'opérandes, 50 locaux, arguments), boucle fetch-décode-exécute
//! sur un programme décodé ou déchiffré paresseusement, et une frontière
//! de résolution de symboles ([`host::SymbolResolver`]) pour tout ce qui
//! touche le programme hôte.
//!
//! Deux portes d'entrée :
//! - [`run`] : scellé → déchiffre, décode paresseusement, exécute ;
//! - [`execute`] : programme déjà décodé → exécute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod context;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod host;
pub mod stack;

pub use context::{Context, InstructionSource};
pub use error::{VmError, VmResult};
pub use host::{HostCallable, HostField, NullResolver, ParamSpec, SymbolKind, SymbolResolver};

use roseau_core::bytecode::codec::WireProgram;
use roseau_core::{secret, Program, Value};

/// Déchiffre puis exécute un programme scellé.
///
/// `key`, `iv` et `data` sont les trois champs base64 de l'enveloppe.
/// Le texte filaire est décodé paresseusement, instruction par
/// instruction, au fil de l'exécution.
pub fn run(
    key: &str,
    iv: &str,
    data: &str,
    args: Vec<Value>,
    resolver: &dyn SymbolResolver,
) -> VmResult<Value> {
    let wire = secret::decrypt(key, iv, data)?;
    let program = WireProgram::new(&wire);
    tracing::debug!(instructions = program.len(), "programme déchiffré");
    Context::new(args, resolver).run(&program)
}

/// Exécute un programme déjà décodé.
pub fn execute(program: &Program, args: Vec<Value>, resolver: &dyn SymbolResolver) -> VmResult<Value> {
    Context::new(args, resolver).run(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use roseau_core::bytecode::codec;
    use roseau_core::{Instruction, OpCode};

    #[test]
    fn scelle_puis_execute() {
        let program = Program::from(vec![
            Instruction::new(OpCode::HxLdc, "40"),
            Instruction::new(OpCode::HxLdc, "2"),
            Instruction::bare(OpCode::Add),
            Instruction::bare(OpCode::Ret),
        ]);
        let sealed = secret::encrypt(&codec::encode(&program));
        let result = run(&sealed.key, &sealed.iv, &sealed.data, Vec::new(), &NullResolver).unwrap();
        assert_eq!(result, Value::I64(42));
    }

    #[test]
    fn enveloppe_corrompue() {
        let sealed = secret::encrypt("29,");
        let err = run(&sealed.key, &sealed.iv, "pas-du-base64", Vec::new(), &NullResolver);
        assert!(matches!(err, Err(VmError::Decode(_))));
    }
}
