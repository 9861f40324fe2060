//! roseau-cli (lib) — logique des sous-commandes.
//!
//! Le binaire (`main.rs`) ne fait que parser les arguments et initialiser
//! la journalisation ; tout le travail vit ici, testable sans processus.
//!
//! Deux formats texte sont définis dans ce crate :
//! - le **listage** : format d'échange du front-end, un mnémonique et son
//!   opérande par ligne, procédures délimitées par `proc <nom>` / `end` ;
//! - l'**artefact** : un enregistrement par ligne,
//!   `<nom> <clé> <iv> <données>`, les trois derniers en base64 tels que
//!   rendus par le scellage.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};

use roseau_compiler::{
    seal, translate_all, CallKind, CallTarget, SourceOp, SourceProcedure, TokenKind, TokenRef,
};
use roseau_core::bytecode::codec;
use roseau_core::{secret, Value};
use roseau_vm::NullResolver;

/* ─────────────────────────── Listage ─────────────────────────── */

/// Parse un listage : `proc <nom>` ouvre une procédure, `end` la ferme,
/// une instruction par ligne entre les deux. Lignes vides et lignes
/// `#`-commentées ignorées.
pub fn parse_listing(text: &str) -> Result<Vec<SourceProcedure>> {
    let mut procedures = Vec::new();
    let mut current: Option<SourceProcedure> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let at = lineno + 1;

        if let Some(name) = line.strip_prefix("proc ") {
            if current.is_some() {
                bail!("ligne {at}: `proc` imbriqué");
            }
            current = Some(SourceProcedure { name: name.trim().to_owned(), ops: Vec::new() });
            continue;
        }
        if line == "end" {
            match current.take() {
                Some(proc) => procedures.push(proc),
                None => bail!("ligne {at}: `end` sans `proc`"),
            }
            continue;
        }

        let proc = current
            .as_mut()
            .with_context(|| format!("ligne {at}: instruction hors de toute procédure"))?;
        let op = parse_op(line).with_context(|| format!("ligne {at}: {line:?}"))?;
        proc.ops.push(op);
    }

    if let Some(proc) = current {
        bail!("procédure {:?} jamais fermée par `end`", proc.name);
    }
    Ok(procedures)
}

fn parse_op(line: &str) -> Result<SourceOp> {
    let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
        Some((m, r)) => (m, r.trim()),
        None => (line, ""),
    };

    let op = match mnemonic {
        "ldc" => SourceOp::Ldc(Value::I64(rest.parse().context("entier attendu")?)),
        "ldc.r4" => SourceOp::Ldc(Value::F32(rest.parse().context("flottant attendu")?)),
        "ldc.r8" => SourceOp::Ldc(Value::F64(rest.parse().context("flottant attendu")?)),
        "ldstr" => SourceOp::Ldc(Value::Str(rest.to_owned())),
        "ldtoken" => {
            let (kind, token) = rest.split_once(' ').context("`ldtoken <nature> <jeton>`")?;
            SourceOp::LdToken(TokenRef {
                kind: token_kind(kind)?,
                token: token.trim().parse().context("jeton non décimal")?,
            })
        }
        "call" | "callvirt" => {
            let mut parts = rest.split_whitespace();
            let kind = parts.next().context("`call <def|ref> <jeton> <nom>`")?;
            let token: i64 =
                parts.next().context("jeton manquant")?.parse().context("jeton non décimal")?;
            let name = parts.next().unwrap_or("");
            // les noms de constructeur forcent la nature 0, quelle que
            // soit la forme d'appel
            let kind = if name == ".ctor" || name == ".cctor" {
                CallKind::Constructor
            } else {
                match kind {
                    "def" => CallKind::Definition,
                    "ref" => CallKind::MemberRef,
                    other => bail!("nature d'appel inconnue: {other:?}"),
                }
            };
            SourceOp::Call {
                virtual_dispatch: mnemonic == "callvirt",
                target: CallTarget { kind, token },
            }
        }
        "br" => SourceOp::Br(rest.parse().context("index de saut attendu")?),
        "brtrue" => SourceOp::Brtrue(rest.parse().context("index de saut attendu")?),
        "brfalse" => SourceOp::Brfalse(rest.parse().context("index de saut attendu")?),
        "leave" => SourceOp::Leave(rest.parse().context("index de saut attendu")?),
        "box" => SourceOp::Box(rest.to_owned()),
        "ldelem" => SourceOp::LdElem,
        "stelem" => SourceOp::StElem,
        "ldloc" => SourceOp::LdLoc(rest.parse().context("index attendu")?),
        "stloc" => SourceOp::StLoc(rest.parse().context("index attendu")?),
        "ldarg" => SourceOp::LdArg(rest.parse().context("index attendu")?),
        "starg" => SourceOp::StArg(rest.parse().context("index attendu")?),
        "ldfld" => SourceOp::LdFld {
            is_static: false,
            token: rest.parse().context("jeton non décimal")?,
        },
        "ldsfld" => SourceOp::LdFld {
            is_static: true,
            token: rest.parse().context("jeton non décimal")?,
        },
        "conv.r4" => SourceOp::ConvR4,
        "conv.r8" => SourceOp::ConvR8,
        "newobj" => SourceOp::Newobj(rest.parse().context("jeton non décimal")?),
        other if rest.is_empty() => SourceOp::Other(other.to_owned()),
        other => bail!("mnémonique inconnu avec opérande: {other:?}"),
    };
    Ok(op)
}

fn token_kind(word: &str) -> Result<TokenKind> {
    Ok(match word {
        "method" => TokenKind::Method,
        "member" => TokenKind::MemberRef,
        "field" => TokenKind::Field,
        "type" => TokenKind::Type,
        other => bail!("nature de jeton inconnue: {other:?}"),
    })
}

/* ─────────────────────────── Artefact ─────────────────────────── */

/// Enregistrement d'artefact : une procédure scellée.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactRecord {
    /// Nom de la procédure.
    pub name: String,
    /// Clé, IV et texte chiffré, en base64.
    pub key: String,
    /// Vecteur d'initialisation.
    pub iv: String,
    /// Texte filaire chiffré.
    pub data: String,
}

impl ArtefactRecord {
    fn to_line(&self) -> String {
        format!("{} {} {} {}", self.name, self.key, self.iv, self.data)
    }

    fn from_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let take = |parts: &mut std::str::SplitWhitespace<'_>| {
            parts.next().map(str::to_owned).context("enregistrement incomplet")
        };
        let record = Self {
            name: take(&mut parts)?,
            key: take(&mut parts)?,
            iv: take(&mut parts)?,
            data: take(&mut parts)?,
        };
        if parts.next().is_some() {
            bail!("enregistrement trop long: {line:?}");
        }
        Ok(record)
    }
}

fn parse_artefact(text: &str) -> Result<Vec<ArtefactRecord>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ArtefactRecord::from_line)
        .collect()
}

/* ─────────────────────────── Sous-commandes ─────────────────────────── */

/// `translate` : listage → artefact. Les procédures intraduisibles sont
/// sautées (signalées par le traducteur), les autres scellées.
pub fn translate_listing(listing: &str) -> Result<String> {
    let procedures = parse_listing(listing)?;
    let translated_procedures = translate_all(&procedures);
    tracing::info!(
        sources = procedures.len(),
        scellees = translated_procedures.len(),
        "traduction terminée"
    );
    let mut out = String::new();
    for translated in translated_procedures {
        let sealed = seal(&translated.program);
        let record = ArtefactRecord {
            name: translated.name,
            key: sealed.key,
            iv: sealed.iv,
            data: sealed.data,
        };
        out.push_str(&record.to_line());
        out.push('\n');
    }
    Ok(out)
}

/// `inspect` : artefact → bytecode lisible, une procédure par bloc.
pub fn inspect_artefact(artefact: &str) -> Result<String> {
    let mut out = String::new();
    for record in parse_artefact(artefact)? {
        let wire = secret::decrypt(&record.key, &record.iv, &record.data)
            .with_context(|| format!("procédure {:?}", record.name))?;
        let program = codec::decode(&wire).with_context(|| format!("procédure {:?}", record.name))?;
        let _ = writeln!(out, "{} ({} instructions)", record.name, program.len());
        for (index, instr) in program.iter().enumerate() {
            let _ = writeln!(out, "  {index:4}  {instr}");
        }
    }
    Ok(out)
}

/// `run` : exécute une procédure de l'artefact (la première, ou celle
/// nommée) avec un résolveur qui ne résout rien — tout accès symbolique
/// avorte, ce qui est le chemin fatal documenté.
pub fn run_artefact(artefact: &str, name: Option<&str>, args: &[String]) -> Result<Value> {
    let records = parse_artefact(artefact)?;
    let record = match name {
        Some(wanted) => records
            .into_iter()
            .find(|r| r.name == wanted)
            .with_context(|| format!("procédure introuvable: {wanted:?}"))?,
        None => records.into_iter().next().context("artefact vide")?,
    };
    let args = args.iter().map(|a| parse_arg(a)).collect();
    let result = roseau_vm::run(&record.key, &record.iv, &record.data, args, &NullResolver)
        .with_context(|| format!("procédure {:?}", record.name))?;
    Ok(result)
}

// argument de ligne de commande → valeur : entier, flottant, sinon texte
fn parse_arg(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::I64(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return Value::F64(f);
    }
    Value::Str(text.to_owned())
}

/* --------------------------------- Tests --------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LISTING: &str = "\
# moyenne de deux arguments
proc moyenne
  ldarg 0
  ldarg 1
  add
  ldc 2
  div
  ret
end

proc refusee
  tailcall
end

proc quarante_deux
  ldc 40
  ldc 2
  add
  ret
end
";

    #[test]
    fn listage_parse() {
        let procs = parse_listing(LISTING).unwrap();
        assert_eq!(procs.len(), 3);
        assert_eq!(procs[0].name, "moyenne");
        assert_eq!(procs[0].ops[0], SourceOp::LdArg(0));
        assert_eq!(procs[0].ops[2], SourceOp::Other("add".into()));
        assert_eq!(procs[1].ops, vec![SourceOp::Other("tailcall".into())]);
    }

    #[test]
    fn listage_malforme() {
        assert!(parse_listing("ldc 1\n").is_err());
        assert!(parse_listing("proc a\nproc b\nend\n").is_err());
        assert!(parse_listing("proc a\nldc 1\n").is_err());
        assert!(parse_listing("end\n").is_err());
    }

    #[test]
    fn nom_de_constructeur_force_la_nature() {
        let op = parse_op("callvirt def 12 .ctor").unwrap();
        assert_eq!(
            op,
            SourceOp::Call {
                virtual_dispatch: true,
                target: CallTarget { kind: CallKind::Constructor, token: 12 },
            }
        );
        let op = parse_op("call ref 31 DoThing").unwrap();
        assert_eq!(
            op,
            SourceOp::Call {
                virtual_dispatch: false,
                target: CallTarget { kind: CallKind::MemberRef, token: 31 },
            }
        );
    }

    #[test]
    fn traduit_scelle_puis_execute() {
        let artefact = translate_listing(LISTING).unwrap();
        // la procédure fautive est sautée, les deux autres scellées
        assert_eq!(artefact.lines().count(), 2);

        let result = run_artefact(&artefact, Some("quarante_deux"), &[]).unwrap();
        assert_eq!(result, Value::I64(42));

        // Div rend second ÷ sommet : (0+1) ÷ ldc 2 … l'ordre documenté
        // donne bien la moyenne pour deux arguments
        let args = vec!["10".to_owned(), "4".to_owned()];
        let result = run_artefact(&artefact, Some("moyenne"), &args).unwrap();
        assert_eq!(result, Value::I64(7));
    }

    #[test]
    fn inspection_lisible() {
        let artefact = translate_listing("proc p\nldc 7\nret\nend\n").unwrap();
        let listing = inspect_artefact(&artefact).unwrap();
        assert!(listing.starts_with("p (2 instructions)"));
        assert!(listing.contains("HxLdc 7"));
        assert!(listing.contains("Ret"));
    }

    #[test]
    fn enregistrement_malforme() {
        assert!(parse_artefact("p abc def\n").is_err());
        assert!(parse_artefact("p a b c d e\n").is_err());
    }
}
