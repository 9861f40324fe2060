//! Activation : l'exécution d'un programme contre un vecteur d'arguments.
//!
//! Machine à un seul état (« en cours ») et une seule condition
//! terminale : pointeur d'instruction ≥ longueur du programme. Les
//! branchements posent `ip = cible - 1`, l'incrément inconditionnel de
//! fin de tour atterrit exactement sur la cible. Il n'y a pas de pile
//! d'appels : un appel de procédure est un appel hôte résolu, jamais un
//! saut dans un autre programme.

use roseau_core::bytecode::codec::WireProgram;
use roseau_core::{Instruction, Program, Value};

use crate::error::{VmError, VmResult};
use crate::frame::SlotTable;
use crate::handlers;
use crate::host::SymbolResolver;
use crate::stack::OperandStack;

/* ─────────────────────────── Source d'instructions ─────────────────────────── */

/// Séquence indexée d'instructions exécutables.
///
/// Le moteur tourne aussi bien sur un `Program` déjà décodé que sur un
/// `WireProgram` décodé paresseusement, instruction par instruction.
pub trait InstructionSource {
    /// Nombre d'instructions.
    fn len(&self) -> usize;
    /// Vrai si la séquence est vide.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Instruction à `index`.
    fn fetch(&self, index: usize) -> VmResult<Instruction>;
}

impl InstructionSource for Program {
    fn len(&self) -> usize {
        Program::len(self)
    }

    fn fetch(&self, index: usize) -> VmResult<Instruction> {
        self.get(index).cloned().ok_or_else(|| {
            VmError::Decode(roseau_core::CoreError::Decode(format!(
                "index d'instruction hors programme: {index}"
            )))
        })
    }
}

impl InstructionSource for WireProgram {
    fn len(&self) -> usize {
        WireProgram::len(self)
    }

    fn fetch(&self, index: usize) -> VmResult<Instruction> {
        Ok(WireProgram::fetch(self, index)?)
    }
}

/* ─────────────────────────── Activation ─────────────────────────── */

/// État d'une activation : pile, slots, pointeur d'instruction.
///
/// Créée par invocation, jetée après `run` ; jamais partagée entre
/// invocations concurrentes.
pub struct Context<'h> {
    /// Pile d'opérandes (vide au départ).
    pub stack: OperandStack,
    /// Locaux (50 slots `Null` au départ).
    pub locals: SlotTable,
    /// Arguments (peuplés 1:1 depuis l'appelant, modifiables en place).
    pub args: SlotTable,
    resolver: &'h dyn SymbolResolver,
    ip: i64,
}

impl<'h> Context<'h> {
    /// Activation neuve pour un vecteur d'arguments.
    pub fn new(args: Vec<Value>, resolver: &'h dyn SymbolResolver) -> Self {
        Self {
            stack: OperandStack::new(),
            locals: SlotTable::locals(),
            args: SlotTable::args(args),
            resolver,
            ip: 0,
        }
    }

    /// Résolveur de symboles de l'hôte.
    pub fn resolver(&self) -> &'h dyn SymbolResolver {
        self.resolver
    }

    /// Déroute l'exécution vers `target` (index d'instruction).
    /// Pose `ip = target - 1` ; l'incrément de fin de tour fait le reste.
    pub fn jump_to(&mut self, target: i64) {
        self.ip = target - 1;
    }

    /// Boucle fetch-décode-exécute, jusqu'à la fin du programme ou une
    /// erreur fatale. Rend le sommet de pile, ou `Null` si la pile est
    /// vide.
    pub fn run<S: InstructionSource>(&mut self, program: &S) -> VmResult<Value> {
        self.ip = 0;
        while self.ip >= 0 && (self.ip as usize) < program.len() {
            let instruction = program.fetch(self.ip as usize)?;
            tracing::trace!(ip = self.ip, op = %instruction.opcode(), "exécution");
            handlers::execute(self, &instruction)?;
            self.ip += 1;
        }
        Ok(self.stack.pop().unwrap_or(Value::Null))
    }
}

/* --------------------------------- Tests --------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullResolver;
    use pretty_assertions::assert_eq;
    use roseau_core::OpCode;

    fn run_program(instrs: Vec<Instruction>) -> VmResult<Value> {
        let program = Program::from(instrs);
        Context::new(Vec::new(), &NullResolver).run(&program)
    }

    #[test]
    fn programme_vide_rend_null() {
        assert_eq!(run_program(Vec::new()).unwrap(), Value::Null);
    }

    #[test]
    fn resultat_est_le_sommet_de_pile() {
        let result = run_program(vec![
            Instruction::new(OpCode::Ldc, 1i64),
            Instruction::new(OpCode::Ldc, 2i64),
        ])
        .unwrap();
        assert_eq!(result, Value::I64(2));
    }

    #[test]
    fn branchement_correct() {
        // [Ldc 1, Brtrue(3), Ldc "A", Ldc "B"] → "B"
        let result = run_program(vec![
            Instruction::new(OpCode::Ldc, 1i64),
            Instruction::new(OpCode::Brtrue, 3i64),
            Instruction::new(OpCode::Ldc, "A"),
            Instruction::new(OpCode::Ldc, "B"),
        ])
        .unwrap();
        assert_eq!(result, Value::Str("B".into()));

        // condition inversée : la chute exécute "A" puis saute la fin
        let result = run_program(vec![
            Instruction::new(OpCode::Ldc, 0i64),
            Instruction::new(OpCode::Brtrue, 4i64),
            Instruction::new(OpCode::Ldc, "A"),
            Instruction::new(OpCode::Br, 5i64),
            Instruction::new(OpCode::Ldc, "B"),
        ])
        .unwrap();
        assert_eq!(result, Value::Str("A".into()));
    }

    #[test]
    fn saut_inconditionnel() {
        // Br 3 enjambe le Ldc 8 ; Ret repousse le 7 resté au sommet
        let result = run_program(vec![
            Instruction::new(OpCode::Ldc, 7i64),
            Instruction::new(OpCode::Br, 3i64),
            Instruction::new(OpCode::Ldc, 8i64),
            Instruction::bare(OpCode::Ret),
        ])
        .unwrap();
        assert_eq!(result, Value::I64(7));
    }

    #[test]
    fn execution_paresseuse_sur_filaire() {
        let program = Program::from(vec![
            Instruction::new(OpCode::HxLdc, "10"),
            Instruction::new(OpCode::HxLdc, "3"),
            Instruction::bare(OpCode::Div),
        ]);
        let wire = roseau_core::bytecode::codec::encode(&program);
        let lazy = WireProgram::new(&wire);
        let result = Context::new(Vec::new(), &NullResolver).run(&lazy).unwrap();
        assert_eq!(result, Value::I64(3));
    }

    #[test]
    fn isolation_des_activations() {
        // écrire le local 5 dans une activation ne touche pas l'autre
        let writes = Program::from(vec![
            Instruction::new(OpCode::Ldc, 42i64),
            Instruction::new(OpCode::HxLoc, "15"),
            Instruction::new(OpCode::HxLoc, "05"),
        ]);
        let reads = Program::from(vec![Instruction::new(OpCode::HxLoc, "05")]);

        let first = Context::new(Vec::new(), &NullResolver).run(&writes).unwrap();
        assert_eq!(first, Value::I64(42));
        let second = Context::new(Vec::new(), &NullResolver).run(&reads).unwrap();
        assert_eq!(second, Value::Null);
    }
}
