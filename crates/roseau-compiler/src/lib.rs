//! roseau-compiler — traducteur et scellage.
//!
//! - Entrée : procédures sources normalisées par le front-end externe
//!   (cibles de branchement en index absolus, locaux/arguments par
//!   petits index).
//! - Sortie : un [`Program`] par procédure, une instruction cible par
//!   instruction source, puis une enveloppe scellée (clé/IV/données en
//!   base64) prête à être portée par le site d'appel.
//!
//! Politique d'échec : une instruction intraduisible condamne **toute**
//! sa procédure ([`TranslateError::UnsupportedOpcode`]) — jamais de
//! procédure à moitié virtualisée. La traduction en lot continue sur les
//! autres procédures et signale le saut par `tracing::warn!`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use roseau_core::bytecode::codec;
use roseau_core::secret::{self, SealedProgram};
use roseau_core::{Instruction, OpCode, Program, Value};
use thiserror::Error;

/* ─────────────────────────── Modèle source ─────────────────────────── */

/// Nature d'un jeton symbolique chargé par `LdToken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Méthode définie dans le programme hôte.
    Method,
    /// Membre référencé hors du programme hôte.
    MemberRef,
    /// Champ.
    Field,
    /// Type.
    Type,
}

impl TokenKind {
    // Chiffres d'émission. Le moteur lit 2=type et 3=champ : le
    // désaccord est historique, chaque programme déjà traduit l'embarque.
    fn digit(self) -> u8 {
        match self {
            TokenKind::Method => 0,
            TokenKind::MemberRef => 1,
            TokenKind::Field => 2,
            TokenKind::Type => 3,
        }
    }
}

/// Jeton symbolique (nature + identifiant numérique opaque).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRef {
    /// Nature du symbole.
    pub kind: TokenKind,
    /// Identifiant numérique, jamais interprété ici.
    pub token: i64,
}

/// Nature de la cible d'un appel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Constructeur ou initialiseur statique, quelle que soit la forme
    /// d'appel générique d'origine.
    Constructor,
    /// Définition résoluble dans le programme hôte.
    Definition,
    /// Membre référencé à l'extérieur.
    MemberRef,
}

impl CallKind {
    fn digit(self) -> u8 {
        match self {
            CallKind::Constructor => 0,
            CallKind::Definition => 1,
            CallKind::MemberRef => 2,
        }
    }
}

/// Cible d'un appel (nature + jeton).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTarget {
    /// Nature de la cible.
    pub kind: CallKind,
    /// Jeton numérique de la cible.
    pub token: i64,
}

/// Instruction source normalisée, telle que produite par le front-end.
///
/// Les cibles de branchement sont des index d'instruction absolus dans
/// la même procédure ; la traduction étant 1:1, l'index survit tel quel.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOp {
    /// Chargement de littéral (entier, flottant, texte ou nul).
    Ldc(Value),
    /// Chargement d'un jeton symbolique.
    LdToken(TokenRef),
    /// Appel ; `virtual_dispatch` distingue l'appel virtuel.
    Call {
        /// Dispatch virtuel ou non (porté sur le fil, ignoré à l'exécution).
        virtual_dispatch: bool,
        /// Cible de l'appel.
        target: CallTarget,
    },
    /// Saut inconditionnel.
    Br(usize),
    /// Saut si vrai.
    Brtrue(usize),
    /// Saut si faux.
    Brfalse(usize),
    /// Sortie de bloc protégé ; abaissée en saut inconditionnel.
    Leave(usize),
    /// Boxing ; porte le nom d'affichage du type, informatif seulement.
    Box(String),
    /// Chargement d'un élément de tableau.
    LdElem,
    /// Rangement d'un élément de tableau.
    StElem,
    /// Lecture du local `index`.
    LdLoc(usize),
    /// Écriture du local `index`.
    StLoc(usize),
    /// Lecture de l'argument `index`.
    LdArg(usize),
    /// Écriture de l'argument `index`.
    StArg(usize),
    /// Lecture d'un champ par jeton.
    LdFld {
        /// Champ statique (pas de receveur à dépiler).
        is_static: bool,
        /// Jeton du champ.
        token: i64,
    },
    /// Conversion flottante 32 bits.
    ConvR4,
    /// Conversion flottante 64 bits.
    ConvR8,
    /// Construction d'objet par jeton de constructeur.
    Newobj(i64),
    /// Tout le reste : apparié par nom, sans tenir compte de la casse,
    /// contre le jeu d'opcodes cible.
    Other(String),
}

/// Procédure source : un nom et sa séquence d'instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProcedure {
    /// Nom de la procédure (diagnostics et artefact de sortie).
    pub name: String,
    /// Instructions normalisées.
    pub ops: Vec<SourceOp>,
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de traduction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// Aucun opcode cible ne correspond à l'instruction source.
    /// Condamne la procédure entière.
    #[error("opcode source intraduisible à l'index {index}: {name:?}")]
    UnsupportedOpcode {
        /// Nom de l'instruction source fautive.
        name: String,
        /// Index de l'instruction dans la procédure.
        index: usize,
    },
}

/// Alias résultat du traducteur.
pub type TranslateResult<T> = Result<T, TranslateError>;

/* ─────────────────────────── Abaissement ─────────────────────────── */

/// Traduit une procédure : exactement une instruction cible par
/// instruction source, ou échec de la procédure entière.
pub fn translate(ops: &[SourceOp]) -> TranslateResult<Program> {
    ops.iter()
        .enumerate()
        .map(|(index, op)| lower(op, index))
        .collect::<TranslateResult<Vec<_>>>()
        .map(Program::from)
}

fn lower(op: &SourceOp, index: usize) -> TranslateResult<Instruction> {
    let instr = match op {
        SourceOp::Ldc(value) => Instruction::new(OpCode::HxLdc, value.clone()),
        SourceOp::LdToken(t) => {
            Instruction::new(OpCode::Ldtoken, format!("{}{}", t.kind.digit(), t.token))
        }
        // chiffre de dispatch : 0 virtuel, 1 non virtuel
        SourceOp::Call { virtual_dispatch, target } => Instruction::new(
            OpCode::HxCall,
            format!("{}{}{}", u8::from(!*virtual_dispatch), target.kind.digit(), target.token),
        ),
        SourceOp::Br(target) | SourceOp::Leave(target) => {
            Instruction::new(OpCode::Br, *target as i64)
        }
        SourceOp::Brtrue(target) => Instruction::new(OpCode::Brtrue, *target as i64),
        SourceOp::Brfalse(target) => Instruction::new(OpCode::Brfalse, *target as i64),
        SourceOp::Box(type_name) => Instruction::new(OpCode::Box, type_name.clone()),
        SourceOp::LdElem => Instruction::new(OpCode::HxArray, 0i64),
        SourceOp::StElem => Instruction::new(OpCode::HxArray, 1i64),
        SourceOp::LdLoc(i) => Instruction::new(OpCode::HxLoc, format!("0{i}")),
        SourceOp::StLoc(i) => Instruction::new(OpCode::HxLoc, format!("1{i}")),
        SourceOp::LdArg(i) => Instruction::new(OpCode::HxArg, format!("0{i}")),
        SourceOp::StArg(i) => Instruction::new(OpCode::HxArg, format!("1{i}")),
        SourceOp::LdFld { is_static, token } => {
            Instruction::new(OpCode::HxFld, format!("{}{token}", u8::from(*is_static)))
        }
        SourceOp::ConvR4 => Instruction::new(OpCode::HxConv, 0i64),
        SourceOp::ConvR8 => Instruction::new(OpCode::HxConv, 1i64),
        SourceOp::Newobj(token) => Instruction::new(OpCode::Newobj, *token),
        SourceOp::Other(name) => match OpCode::from_name(name) {
            Some(opcode) => Instruction::bare(opcode),
            None => {
                return Err(TranslateError::UnsupportedOpcode { name: name.clone(), index })
            }
        },
    };
    Ok(instr)
}

/* ─────────────────────────── Traduction en lot ─────────────────────────── */

/// Procédure traduite, prête au scellage.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedProcedure {
    /// Nom repris de la procédure source.
    pub name: String,
    /// Programme traduit.
    pub program: Program,
}

/// Traduit un lot de procédures. Une procédure intraduisible est
/// signalée puis sautée (laissée non virtualisée) ; les autres passent.
pub fn translate_all(procedures: &[SourceProcedure]) -> Vec<TranslatedProcedure> {
    procedures
        .iter()
        .filter_map(|proc| match translate(&proc.ops) {
            Ok(program) => Some(TranslatedProcedure { name: proc.name.clone(), program }),
            Err(err) => {
                tracing::warn!(procedure = %proc.name, %err, "procédure sautée");
                None
            }
        })
        .collect()
}

/* ─────────────────────────── Scellage ─────────────────────────── */

/// Scelle un programme : encodage filaire puis chiffrement sous clé et
/// IV frais. Les trois champs base64 sont portés par le site d'appel.
pub fn seal(program: &Program) -> SealedProgram {
    secret::encrypt(&codec::encode(program))
}

/* --------------------------------- Tests --------------------------------- */
