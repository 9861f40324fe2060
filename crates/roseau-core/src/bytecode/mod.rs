//! Instructions, opcodes et programmes.
//!
//! Un `Program` est une séquence ordonnée, immuable, d'`Instruction`s
//! (opcode + opérande optionnel). Les discriminants d'`OpCode` sont
//! stables : le format filaire les sérialise en décimal.

use core::fmt;

use crate::value::Value;

/// Codec filaire texte (encode côté traducteur, decode côté moteur).
pub mod codec;

/* ─────────────────────────── OpCode ─────────────────────────── */

/// Jeu d'opcodes du VM.
///
/// Les variantes `Hx*` multiplexent des sous-opérations via un préfixe
/// d'opérande (voir la doc du moteur). Ne jamais renuméroter : chaque
/// programme déjà traduit embarque ces valeurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum OpCode {
    HxCall = 0,
    HxLdc = 1,
    HxArray = 2,
    HxLoc = 3,
    HxArg = 4,
    HxFld = 5,
    HxConv = 6,
    Or = 7,
    Null = 8,
    Newarr = 9,
    Ldnull = 10,
    Ldloca = 11,
    Ldlen = 12,
    LdelemU1 = 13,
    Ldc = 14,
    ConvU1 = 15,
    ConvI4 = 16,
    Cmp = 17,
    Clt = 18,
    Cgt = 19,
    Neg = 20,
    Not = 21,
    And = 22,
    Shr = 23,
    Shl = 24,
    Xor = 25,
    Rem = 26,
    Ceq = 27,
    Mul = 28,
    Nop = 29,
    Add = 30,
    Sub = 31,
    Ret = 32,
    Pop = 33,
    Len = 34,
    Dup = 35,
    Div = 36,
    Ldtoken = 37,
    Br = 38,
    Brtrue = 39,
    Brfalse = 40,
    Box = 41,
    Newobj = 42,
    ConvR4 = 43,
    ConvR8 = 44,
}

/// Tous les opcodes, dans l'ordre des discriminants.
pub const ALL_OPCODES: &[OpCode] = &[
    OpCode::HxCall,
    OpCode::HxLdc,
    OpCode::HxArray,
    OpCode::HxLoc,
    OpCode::HxArg,
    OpCode::HxFld,
    OpCode::HxConv,
    OpCode::Or,
    OpCode::Null,
    OpCode::Newarr,
    OpCode::Ldnull,
    OpCode::Ldloca,
    OpCode::Ldlen,
    OpCode::LdelemU1,
    OpCode::Ldc,
    OpCode::ConvU1,
    OpCode::ConvI4,
    OpCode::Cmp,
    OpCode::Clt,
    OpCode::Cgt,
    OpCode::Neg,
    OpCode::Not,
    OpCode::And,
    OpCode::Shr,
    OpCode::Shl,
    OpCode::Xor,
    OpCode::Rem,
    OpCode::Ceq,
    OpCode::Mul,
    OpCode::Nop,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Ret,
    OpCode::Pop,
    OpCode::Len,
    OpCode::Dup,
    OpCode::Div,
    OpCode::Ldtoken,
    OpCode::Br,
    OpCode::Brtrue,
    OpCode::Brfalse,
    OpCode::Box,
    OpCode::Newobj,
    OpCode::ConvR4,
    OpCode::ConvR8,
];

impl OpCode {
    /// Valeur filaire (décimale).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Nom canonique de l'opcode.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::HxCall => "HxCall",
            OpCode::HxLdc => "HxLdc",
            OpCode::HxArray => "HxArray",
            OpCode::HxLoc => "HxLoc",
            OpCode::HxArg => "HxArg",
            OpCode::HxFld => "HxFld",
            OpCode::HxConv => "HxConv",
            OpCode::Or => "Or",
            OpCode::Null => "Null",
            OpCode::Newarr => "Newarr",
            OpCode::Ldnull => "Ldnull",
            OpCode::Ldloca => "Ldloca",
            OpCode::Ldlen => "Ldlen",
            OpCode::LdelemU1 => "LdelemU1",
            OpCode::Ldc => "Ldc",
            OpCode::ConvU1 => "ConvU1",
            OpCode::ConvI4 => "ConvI4",
            OpCode::Cmp => "Cmp",
            OpCode::Clt => "Clt",
            OpCode::Cgt => "Cgt",
            OpCode::Neg => "Neg",
            OpCode::Not => "Not",
            OpCode::And => "And",
            OpCode::Shr => "Shr",
            OpCode::Shl => "Shl",
            OpCode::Xor => "Xor",
            OpCode::Rem => "Rem",
            OpCode::Ceq => "Ceq",
            OpCode::Mul => "Mul",
            OpCode::Nop => "Nop",
            OpCode::Add => "Add",
            OpCode::Sub => "Sub",
            OpCode::Ret => "Ret",
            OpCode::Pop => "Pop",
            OpCode::Len => "Len",
            OpCode::Dup => "Dup",
            OpCode::Div => "Div",
            OpCode::Ldtoken => "Ldtoken",
            OpCode::Br => "Br",
            OpCode::Brtrue => "Brtrue",
            OpCode::Brfalse => "Brfalse",
            OpCode::Box => "Box",
            OpCode::Newobj => "Newobj",
            OpCode::ConvR4 => "ConvR4",
            OpCode::ConvR8 => "ConvR8",
        }
    }

    /// Retrouve un opcode par valeur filaire.
    pub fn from_code(code: u8) -> Option<Self> {
        ALL_OPCODES.iter().copied().find(|op| op.code() == code)
    }

    /// Retrouve un opcode par nom, sans tenir compte de la casse.
    /// C'est la règle de repli du traducteur.
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_OPCODES.iter().copied().find(|op| op.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/* ─────────────────────────── Instruction ─────────────────────────── */

/// Paire (opcode, opérande optionnel). Immuable une fois construite.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    opcode: OpCode,
    operand: Option<Value>,
}

impl Instruction {
    /// Instruction avec opérande. `Str("")` est normalisé en absence
    /// d'opérande : le format filaire ne distingue pas les deux.
    pub fn new(opcode: OpCode, operand: impl Into<Value>) -> Self {
        let operand = match operand.into() {
            Value::Null => None,
            Value::Str(s) if s.is_empty() => None,
            v => Some(v),
        };
        Self { opcode, operand }
    }

    /// Instruction sans opérande.
    pub fn bare(opcode: OpCode) -> Self {
        Self { opcode, operand: None }
    }

    /// Opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Opérande, s'il existe.
    pub fn operand(&self) -> Option<&Value> {
        self.operand.as_ref()
    }

    /// Opérande rendu en texte (vide si absent).
    pub fn operand_text(&self) -> String {
        self.operand.as_ref().map(ToString::to_string).unwrap_or_default()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(v) => write!(f, "{} {v}", self.opcode),
            None => self.opcode.fmt(f),
        }
    }
}

/* ─────────────────────────── Program ─────────────────────────── */

/// Séquence ordonnée, indexée à partir de 0, d'instructions.
///
/// Invariant : tout opérande de branchement résolu est un index valide
/// dans cette même séquence. Jamais modifiée pendant l'exécution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program(Vec<Instruction>);

impl Program {
    /// Programme vide.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Nombre d'instructions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Vrai si le programme est vide.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Instruction à `index`.
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.0.get(index)
    }

    /// Itère sur les instructions.
    pub fn iter(&self) -> core::slice::Iter<'_, Instruction> {
        self.0.iter()
    }
}

impl From<Vec<Instruction>> for Program {
    fn from(instrs: Vec<Instruction>) -> Self {
        Self(instrs)
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = core::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/* --------------------------------- Tests --------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn codes_stables() {
        assert_eq!(OpCode::HxCall.code(), 0);
        assert_eq!(OpCode::Newobj.code(), 42);
        for op in ALL_OPCODES {
            assert_eq!(OpCode::from_code(op.code()), Some(*op));
        }
    }

    #[test]
    fn nom_insensible_a_la_casse() {
        assert_eq!(OpCode::from_name("add"), Some(OpCode::Add));
        assert_eq!(OpCode::from_name("LDELEMU1"), Some(OpCode::LdelemU1));
        assert_eq!(OpCode::from_name("ldelem.u1"), None);
        assert_eq!(OpCode::from_name("calli"), None);
    }

    #[test]
    fn operande_vide_normalise() {
        assert_eq!(Instruction::new(OpCode::Ldc, ""), Instruction::bare(OpCode::Ldc));
        assert_eq!(Instruction::new(OpCode::Ldc, Value::Null), Instruction::bare(OpCode::Ldc));
        assert_ne!(Instruction::new(OpCode::Ldc, "x"), Instruction::bare(OpCode::Ldc));
    }
}
