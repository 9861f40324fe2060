//! Codec filaire texte.
//!
//! Format (exact au bit près) :
//! ```text
//! programme  = instruction *( ";" instruction )      — pas de ";" final
//! instruction = <opcode décimal> "," <base64(utf8(opérande, vide si absent))>
//! ```
//! Le décodage scinde chaque bloc sur la **première** virgule seulement :
//! le texte base64 n'en contient pas, mais la règle reste explicite.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::bytecode::{Instruction, OpCode, Program};
use crate::value::Value;
use crate::{CoreError, CoreResult};

/// Sérialise un programme vers le texte filaire.
pub fn encode(program: &Program) -> String {
    let mut out = String::new();
    for (i, instr) in program.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push_str(&instr.opcode().code().to_string());
        out.push(',');
        out.push_str(&B64.encode(instr.operand_text().as_bytes()));
    }
    out
}

/// Désérialise le texte filaire vers un programme.
pub fn decode(wire: &str) -> CoreResult<Program> {
    if wire.is_empty() {
        return Ok(Program::new());
    }
    wire.split(';').map(decode_one).collect()
}

/// Décode une seule instruction filaire.
pub fn decode_one(chunk: &str) -> CoreResult<Instruction> {
    let (code, operand) = chunk
        .split_once(',')
        .ok_or_else(|| CoreError::Decode(format!("instruction sans virgule: {chunk:?}")))?;

    let code: u8 = code
        .parse()
        .map_err(|_| CoreError::Decode(format!("opcode non décimal: {code:?}")))?;
    let opcode = OpCode::from_code(code)
        .ok_or_else(|| CoreError::Decode(format!("opcode inconnu: {code}")))?;

    let bytes = B64
        .decode(operand)
        .map_err(|e| CoreError::Decode(format!("base64 invalide: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CoreError::Decode(format!("opérande non UTF-8: {e}")))?;

    if text.is_empty() {
        Ok(Instruction::bare(opcode))
    } else {
        Ok(Instruction::new(opcode, Value::Str(text)))
    }
}

/* ─────────────────────────── Décodage paresseux ─────────────────────────── */

/// Programme filaire scindé mais non décodé : chaque instruction est
/// décodée au moment où le moteur la fetch.
#[derive(Debug, Clone)]
pub struct WireProgram {
    chunks: Vec<String>,
}

impl WireProgram {
    /// Scinde le texte filaire en blocs d'instruction.
    pub fn new(wire: &str) -> Self {
        let chunks = if wire.is_empty() {
            Vec::new()
        } else {
            wire.split(';').map(str::to_owned).collect()
        };
        Self { chunks }
    }

    /// Nombre d'instructions.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Vrai si le programme est vide.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Décode l'instruction à `index`.
    pub fn fetch(&self, index: usize) -> CoreResult<Instruction> {
        let chunk = self
            .chunks
            .get(index)
            .ok_or_else(|| CoreError::Decode(format!("index d'instruction hors programme: {index}")))?;
        decode_one(chunk)
    }
}

/* --------------------------------- Tests --------------------------------- */
