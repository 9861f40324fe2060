//! Frontière de résolution de symboles hôtes.
//!
//! Le moteur ne connaît rien des métadonnées du programme hôte : il
//! transmet des jetons numériques opaques au résolveur et reçoit des
//! capacités invocables (`HostCallable`), lisibles (`HostField`) ou des
//! poignées de type. « introuvable » (`None`) est distinct d'une poignée
//! résolue mais inutilisable, et le moteur le traite comme fatal.
//!
//! Les résolutions doivent être stables et sans effet de bord au sein
//! d'une exécution ; le résolveur peut mettre ses recherches en cache et
//! être partagé entre activations concurrentes.

use core::fmt;
use std::sync::Arc;

use roseau_core::value::HandleValue;
use roseau_core::Value;

use crate::error::{VmError, VmResult};
use crate::stack::OperandStack;

/* ─────────────────────────── Nature des symboles ─────────────────────────── */

/// Nature d'une résolution demandée au résolveur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Constructeur.
    Constructor,
    /// Méthode définie dans le programme hôte.
    Method,
    /// Membre référencé hors du programme hôte.
    MemberRef,
    /// Champ.
    Field,
    /// Type.
    Type,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolKind::Constructor => "constructeur",
            SymbolKind::Method => "méthode",
            SymbolKind::MemberRef => "membre",
            SymbolKind::Field => "champ",
            SymbolKind::Type => "type",
        })
    }
}

/* ─────────────────────────── Capacités hôtes ─────────────────────────── */

/// Type de paramètre déclaré d'un invocable hôte.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    /// Booléen.
    Bool,
    /// Entier signé 64 bits.
    I64,
    /// Octet non signé.
    U8,
    /// Flottant 32 bits.
    F32,
    /// Flottant 64 bits.
    F64,
    /// Texte.
    Str,
    /// Tableau d'octets.
    Bytes,
    /// N'importe quelle valeur, transmise telle quelle.
    Any,
    /// Type énuméré : constantes nommées et leur valeur.
    Enum(Vec<(String, i64)>),
}

impl ParamSpec {
    /// Nom du type déclaré, pour les messages d'erreur.
    pub fn name(&self) -> &'static str {
        match self {
            ParamSpec::Bool => "bool",
            ParamSpec::I64 => "i64",
            ParamSpec::U8 => "u8",
            ParamSpec::F32 => "f32",
            ParamSpec::F64 => "f64",
            ParamSpec::Str => "str",
            ParamSpec::Bytes => "bytes",
            ParamSpec::Any => "any",
            ParamSpec::Enum(_) => "enum",
        }
    }
}

/// Invocable hôte résolu (constructeur, méthode ou membre).
pub trait HostCallable: Send + Sync {
    /// Vrai si l'invocable n'attend pas de receveur.
    fn is_static(&self) -> bool {
        true
    }

    /// Types de paramètres déclarés, dans l'ordre.
    fn params(&self) -> &[ParamSpec];

    /// Invoque avec le receveur éventuel et les arguments coercés.
    /// `Ok(None)` pour un invocable sans valeur de retour.
    fn invoke(&self, target: Option<Value>, args: Vec<Value>) -> Result<Option<Value>, String>;
}

/// Champ hôte résolu.
pub trait HostField: Send + Sync {
    /// Lit le champ ; `instance` est `None` pour un champ statique.
    fn read(&self, instance: Option<Value>) -> Result<Value, String>;
}

/// Résolveur de symboles du programme hôte.
///
/// Les jetons sont opaques : le moteur ne fait que les transmettre.
pub trait SymbolResolver: Send + Sync {
    /// Résout un constructeur.
    fn resolve_constructor(&self, token: i64) -> Option<Arc<dyn HostCallable>>;
    /// Résout une méthode définie.
    fn resolve_method(&self, token: i64) -> Option<Arc<dyn HostCallable>>;
    /// Résout un membre référencé.
    fn resolve_member(&self, token: i64) -> Option<Arc<dyn HostCallable>>;
    /// Résout un champ.
    fn resolve_field(&self, token: i64) -> Option<Arc<dyn HostField>>;
    /// Résout un type vers une poignée opaque.
    fn resolve_type(&self, token: i64) -> Option<HandleValue>;
}

/// Résolveur qui ne résout rien : tout symbole est introuvable.
///
/// Utile pour exécuter des programmes qui ne touchent pas l'hôte ; le
/// premier accès symbolique avorte avec `UnknownSymbol`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl SymbolResolver for NullResolver {
    fn resolve_constructor(&self, _token: i64) -> Option<Arc<dyn HostCallable>> {
        None
    }
    fn resolve_method(&self, _token: i64) -> Option<Arc<dyn HostCallable>> {
        None
    }
    fn resolve_member(&self, _token: i64) -> Option<Arc<dyn HostCallable>> {
        None
    }
    fn resolve_field(&self, _token: i64) -> Option<Arc<dyn HostField>> {
        None
    }
    fn resolve_type(&self, _token: i64) -> Option<HandleValue> {
        None
    }
}

/* ─────────────────────────── Marshalling ─────────────────────────── */

/// Coercition en deux temps vers un type de paramètre déclaré :
/// conversion native, puis appariement aux constantes énumérées.
/// L'échec des deux est fatal à l'activation.
pub fn coerce(value: Value, spec: &ParamSpec) -> VmResult<Value> {
    let fail = |value: &Value| VmError::ParameterCoercion { expected: spec.name(), got: value.kind() };

    match spec {
        ParamSpec::Any => Ok(value),
        ParamSpec::Bool => match &value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Str(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::Str(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => match other.as_i64() {
                Some(i) => Ok(Value::Bool(i != 0)),
                None => Err(fail(&value)),
            },
        },
        ParamSpec::I64 => value.as_i64().map(Value::I64).ok_or_else(|| fail(&value)),
        ParamSpec::U8 => value
            .as_i64()
            .and_then(|i| u8::try_from(i).ok())
            .map(|b| Value::I64(i64::from(b)))
            .ok_or_else(|| fail(&value)),
        ParamSpec::F32 => value.as_f32().map(Value::F32).ok_or_else(|| fail(&value)),
        ParamSpec::F64 => value.as_f64().map(Value::F64).ok_or_else(|| fail(&value)),
        ParamSpec::Str => match value {
            Value::Str(s) => Ok(Value::Str(s)),
            other => Ok(Value::Str(other.to_string())),
        },
        ParamSpec::Bytes => match value {
            Value::Bytes(b) => Ok(Value::Bytes(b)),
            other => Err(fail(&other)),
        },
        ParamSpec::Enum(constants) => {
            // la valeur est lue comme nom symbolique de constante,
            // sinon comme valeur numérique d'une constante connue
            let text = value.to_string();
            if let Some((_, v)) = constants.iter().find(|(name, _)| *name == text) {
                return Ok(Value::I64(*v));
            }
            if let Some(i) = value.as_i64() {
                if constants.iter().any(|(_, v)| *v == i) {
                    return Ok(Value::I64(i));
                }
            }
            Err(fail(&value))
        }
    }
}

/// Dépile et coerce les arguments d'appel : dernier paramètre déclaré
/// dépilé en premier. Le receveur éventuel reste sous les paramètres et
/// se dépile après coup, côté appelant.
pub fn pop_call_args(stack: &mut OperandStack, params: &[ParamSpec]) -> VmResult<Vec<Value>> {
    let mut out = vec![Value::Null; params.len()];
    for i in (0..params.len()).rev() {
        let value = stack.pop()?;
        out[i] = coerce(value, &params[i])?;
    }
    Ok(out)
}

/* --------------------------------- Tests --------------------------------- */
