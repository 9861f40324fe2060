//! Modèle de valeurs dynamiques.
//!
//! `Value` circule sur la pile d'opérandes, dans les slots (locaux et
//! arguments) et comme opérande d'instruction. Les opérateurs binaires
//! appliquent une promotion numérique explicite : entier × flottant →
//! flottant le plus large. Le codec filaire décodant chaque opérande en
//! texte, les numéraux textuels participent à la coercition (`"10"` se
//! lit comme `10`).
//!
//! Les tableaux (`Bytes`, `Array`) ont une sémantique de référence : un
//! clone partage le même contenu, comme les tableaux du programme hôte.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;

/* ─────────────────────────── Tableaux partagés ─────────────────────────── */

/// Tableau d'octets partagé (élément `u8`).
#[derive(Clone, Default)]
pub struct ByteArray(Arc<RwLock<Vec<u8>>>);

impl ByteArray {
    /// Alloue un tableau de `len` octets à zéro.
    pub fn zeroed(len: usize) -> Self {
        Self(Arc::new(RwLock::new(vec![0; len])))
    }

    /// Nombre d'éléments.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Vrai si le tableau est vide.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Lit l'octet à `idx`.
    pub fn get(&self, idx: usize) -> Option<u8> {
        self.0.read().get(idx).copied()
    }

    /// Écrit l'octet à `idx`. Échoue hors bornes.
    pub fn set(&self, idx: usize, byte: u8) -> bool {
        match self.0.write().get_mut(idx) {
            Some(slot) => {
                *slot = byte;
                true
            }
            None => false,
        }
    }

    /// Copie du contenu.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.read().clone()
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::new(RwLock::new(bytes)))
    }
}

impl PartialEq for ByteArray {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0.read() == *other.0.read()
    }
}

impl fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes(len={})", self.len())
    }
}

/// Tableau de valeurs partagé.
#[derive(Clone, Default)]
pub struct ValueArray(Arc<RwLock<Vec<Value>>>);

impl ValueArray {
    /// Nombre d'éléments.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Vrai si le tableau est vide.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Clone de l'élément à `idx`.
    pub fn get(&self, idx: usize) -> Option<Value> {
        self.0.read().get(idx).cloned()
    }

    /// Remplace l'élément à `idx`. Échoue hors bornes.
    pub fn set(&self, idx: usize, value: Value) -> bool {
        match self.0.write().get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl From<Vec<Value>> for ValueArray {
    fn from(values: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(values)))
    }
}

impl PartialEq for ValueArray {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0.read() == *other.0.read()
    }
}

impl fmt::Debug for ValueArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array(len={})", self.len())
    }
}

/* ─────────────────────────── Poignée opaque ─────────────────────────── */

/// Poignée opaque vers un objet du programme hôte.
///
/// Le VM ne l'interprète jamais : elle transite de la résolution de
/// symboles vers les appels hôtes. L'égalité est l'identité de pointeur.
#[derive(Clone)]
pub struct HandleValue(Arc<dyn Any + Send + Sync>);

impl HandleValue {
    /// Enveloppe un objet hôte arbitraire.
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    /// Tente de relire l'objet sous son type concret.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for HandleValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HandleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handle(..)")
    }
}

/* ─────────────────────────── Valeur taguée ─────────────────────────── */

/// Valeur dynamique du VM.
#[derive(Clone, PartialEq, Default)]
pub enum Value {
    /// Absence de valeur.
    #[default]
    Null,
    /// Booléen.
    Bool(bool),
    /// Entier signé 64 bits (largeur native hôte).
    I64(i64),
    /// Flottant 32 bits.
    F32(f32),
    /// Flottant 64 bits.
    F64(f64),
    /// Texte UTF-8 possédé.
    Str(String),
    /// Tableau d'octets partagé.
    Bytes(ByteArray),
    /// Tableau de valeurs partagé.
    Array(ValueArray),
    /// Poignée opaque hôte.
    Handle(HandleValue),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::I64(i) => write!(f, "I64({i})"),
            Value::F32(x) => write!(f, "F32({x})"),
            Value::F64(x) => write!(f, "F64({x})"),
            Value::Str(s) => {
                if s.len() > 64 {
                    // tronque sur une frontière de caractère
                    let cut = s
                        .char_indices()
                        .map(|(i, _)| i)
                        .take_while(|i| *i <= 64)
                        .last()
                        .unwrap_or(0);
                    write!(f, "Str({}…)", &s[..cut])
                } else {
                    write!(f, "Str({s})")
                }
            }
            Value::Bytes(b) => b.fmt(f),
            Value::Array(a) => a.fmt(f),
            Value::Handle(h) => h.fmt(f),
        }
    }
}

/// Rendu textuel d'opérande (celui du codec filaire). `Null` s'affiche
/// vide, les nombres via leur `Display` natif (round-trip exact).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I64(i) => write!(f, "{i}"),
            Value::F32(x) => write!(f, "{x}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<bytes:{}>", b.len()),
            Value::Array(a) => write!(f, "<array:{}>", a.len()),
            Value::Handle(_) => f.write_str("<handle>"),
        }
    }
}

/* Conversions conviviales */
impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I64(i64::from(v))
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(ByteArray::from(v))
    }
}
impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(ValueArray::from(v))
    }
}

/* ─────────────────────────── Coercition numérique ─────────────────────────── */

/// Représentation numérique intermédiaire avant promotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    /// Entier 64 bits.
    I(i64),
    /// Flottant 32 bits.
    F32(f32),
    /// Flottant 64 bits.
    F64(f64),
}

/// Paire promue au type commun le plus large.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Promoted {
    I(i64, i64),
    F32(f32, f32),
    F64(f64, f64),
}

fn promote(a: Num, b: Num) -> Promoted {
    use Num::{F32, F64, I};
    match (a, b) {
        (I(x), I(y)) => Promoted::I(x, y),
        (F32(x), F32(y)) => Promoted::F32(x, y),
        (F32(x), I(y)) => Promoted::F32(x, y as f32),
        (I(x), F32(y)) => Promoted::F32(x as f32, y),
        (F64(x), F64(y)) => Promoted::F64(x, y),
        (F64(x), I(y)) => Promoted::F64(x, y as f64),
        (I(x), F64(y)) => Promoted::F64(x as f64, y),
        (F64(x), F32(y)) => Promoted::F64(x, f64::from(y)),
        (F32(x), F64(y)) => Promoted::F64(f64::from(x), y),
    }
}

impl Value {
    /// Nom du variant, pour les messages d'erreur.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Handle(_) => "handle",
        }
    }

    /// Vrai pour `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lecture numérique : booléens, entiers, flottants, numéraux textuels.
    pub fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::I(i64::from(*b))),
            Value::I64(i) => Some(Num::I(*i)),
            Value::F32(x) => Some(Num::F32(*x)),
            Value::F64(x) => Some(Num::F64(*x)),
            Value::Str(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Some(Num::I(i))
                } else if let Ok(x) = s.parse::<f64>() {
                    Some(Num::F64(x))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Coercition entière (les flottants sont tronqués).
    pub fn as_i64(&self) -> Option<i64> {
        match self.as_num()? {
            Num::I(i) => Some(i),
            Num::F32(x) => Some(x as i64),
            Num::F64(x) => Some(x as i64),
        }
    }

    /// Coercition flottante 64 bits.
    pub fn as_f64(&self) -> Option<f64> {
        match self.as_num()? {
            Num::I(i) => Some(i as f64),
            Num::F32(x) => Some(f64::from(x)),
            Num::F64(x) => Some(x),
        }
    }

    /// Coercition flottante 32 bits.
    pub fn as_f32(&self) -> Option<f32> {
        match self.as_num()? {
            Num::I(i) => Some(i as f32),
            Num::F32(x) => Some(x),
            Num::F64(x) => Some(x as f32),
        }
    }

    /// Valeur de vérité entière : `true` → 1, sinon lecture numérique.
    pub fn truth(&self) -> Option<i64> {
        self.as_i64()
    }
}

/* ─────────────────────────── Opérateurs binaires ─────────────────────────── */

/// Addition après promotion.
pub fn add(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::I64(x.checked_add(y)?)),
        Promoted::F32(x, y) => Some(Value::F32(x + y)),
        Promoted::F64(x, y) => Some(Value::F64(x + y)),
    }
}

/// Soustraction `a - b` après promotion.
pub fn sub(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::I64(x.checked_sub(y)?)),
        Promoted::F32(x, y) => Some(Value::F32(x - y)),
        Promoted::F64(x, y) => Some(Value::F64(x - y)),
    }
}

/// Multiplication après promotion.
pub fn mul(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::I64(x.checked_mul(y)?)),
        Promoted::F32(x, y) => Some(Value::F32(x * y)),
        Promoted::F64(x, y) => Some(Value::F64(x * y)),
    }
}

/// Division `a / b` après promotion. Division entière si les deux
/// opérandes sont entiers ; `None` sur division entière par zéro.
pub fn div(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::I64(x.checked_div(y)?)),
        Promoted::F32(x, y) => Some(Value::F32(x / y)),
        Promoted::F64(x, y) => Some(Value::F64(x / y)),
    }
}

/// Reste `a % b` après promotion.
pub fn rem(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::I64(x.checked_rem(y)?)),
        Promoted::F32(x, y) => Some(Value::F32(x % y)),
        Promoted::F64(x, y) => Some(Value::F64(x % y)),
    }
}

/// ET bit à bit (opérandes entiers).
pub fn bit_and(a: &Value, b: &Value) -> Option<Value> {
    Some(Value::I64(a.as_i64()? & b.as_i64()?))
}

/// OU bit à bit (opérandes entiers).
pub fn bit_or(a: &Value, b: &Value) -> Option<Value> {
    Some(Value::I64(a.as_i64()? | b.as_i64()?))
}

/// OU exclusif bit à bit (opérandes entiers).
pub fn bit_xor(a: &Value, b: &Value) -> Option<Value> {
    Some(Value::I64(a.as_i64()? ^ b.as_i64()?))
}

/// Décalage gauche `a << b`. Le compte est masqué à 63 bits, comme chez
/// l'hôte.
pub fn shl(a: &Value, b: &Value) -> Option<Value> {
    let count = (b.as_i64()? & 63) as u32;
    Some(Value::I64(a.as_i64()?.wrapping_shl(count)))
}

/// Décalage droit arithmétique `a >> b`, compte masqué à 63 bits.
pub fn shr(a: &Value, b: &Value) -> Option<Value> {
    let count = (b.as_i64()? & 63) as u32;
    Some(Value::I64(a.as_i64()?.wrapping_shr(count)))
}

/// Négation arithmétique.
pub fn neg(a: &Value) -> Option<Value> {
    match a.as_num()? {
        Num::I(i) => Some(Value::I64(i.checked_neg()?)),
        Num::F32(x) => Some(Value::F32(-x)),
        Num::F64(x) => Some(Value::F64(-x)),
    }
}

/// Complément bit à bit (opérande entier).
pub fn bit_not(a: &Value) -> Option<Value> {
    Some(Value::I64(!a.as_i64()?))
}

/// Comparaison stricte `a < b` après promotion.
pub fn lt(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::Bool(x < y)),
        Promoted::F32(x, y) => Some(Value::Bool(x < y)),
        Promoted::F64(x, y) => Some(Value::Bool(x < y)),
    }
}

/// Comparaison stricte `a > b` après promotion.
pub fn gt(a: &Value, b: &Value) -> Option<Value> {
    match promote(a.as_num()?, b.as_num()?) {
        Promoted::I(x, y) => Some(Value::Bool(x > y)),
        Promoted::F32(x, y) => Some(Value::Bool(x > y)),
        Promoted::F64(x, y) => Some(Value::Bool(x > y)),
    }
}

/// Égalité de valeurs hôtes : promotion numérique quand les deux côtés
/// se lisent comme nombres, sinon égalité structurelle du même variant.
/// Jamais une identité de référence pour les primitives.
pub fn eq(a: &Value, b: &Value) -> Value {
    let equal = match (a.as_num(), b.as_num()) {
        (Some(x), Some(y)) => match promote(x, y) {
            Promoted::I(x, y) => x == y,
            Promoted::F32(x, y) => x == y,
            Promoted::F64(x, y) => x == y,
        },
        _ => a == b,
    };
    Value::Bool(equal)
}

/* --------------------------------- Tests --------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn promotion_mixte() {
        assert_eq!(add(&Value::I64(1), &Value::F64(0.5)), Some(Value::F64(1.5)));
        assert_eq!(add(&Value::I64(1), &Value::F32(0.5)), Some(Value::F32(1.5)));
        assert_eq!(mul(&Value::I64(6), &Value::I64(7)), Some(Value::I64(42)));
    }

    #[test]
    fn division_entiere() {
        assert_eq!(div(&Value::I64(10), &Value::I64(3)), Some(Value::I64(3)));
        assert_eq!(div(&Value::I64(1), &Value::I64(0)), None);
    }

    #[test]
    fn numeraux_textuels() {
        assert_eq!(Value::Str("10".into()).as_i64(), Some(10));
        assert_eq!(Value::Str("2.5".into()).as_f64(), Some(2.5));
        assert_eq!(Value::Str("abc".into()).as_i64(), None);
        assert_eq!(add(&Value::Str("4".into()), &Value::I64(2)), Some(Value::I64(6)));
    }

    #[test]
    fn debug_tronque_sur_frontiere_de_caractere() {
        // « é » (2 octets) à cheval sur le 64e octet : la troncature
        // recule sur la frontière précédente au lieu de couper le
        // caractère en deux
        let mut s = "x".repeat(63);
        s.push_str("ééé");
        assert_eq!(s.len(), 69);
        let rendered = format!("{:?}", Value::Str(s));
        assert_eq!(rendered, format!("Str({}…)", "x".repeat(63)));

        // frontière exacte : 64 octets ASCII conservés tels quels
        let rendered = format!("{:?}", Value::Str(format!("{}y", "x".repeat(64))));
        assert_eq!(rendered, format!("Str({}…)", "x".repeat(64)));
    }

    #[test]
    fn verite() {
        assert_eq!(Value::Bool(true).truth(), Some(1));
        assert_eq!(Value::Bool(false).truth(), Some(0));
        assert_eq!(Value::Str("1".into()).truth(), Some(1));
        assert_eq!(Value::Null.truth(), None);
    }

    #[test]
    fn egalite_valeur_hote() {
        assert_eq!(eq(&Value::I64(5), &Value::F64(5.0)), Value::Bool(true));
        assert_eq!(eq(&Value::Str("a".into()), &Value::Str("a".into())), Value::Bool(true));
        assert_eq!(eq(&Value::Null, &Value::Null), Value::Bool(true));
        assert_eq!(eq(&Value::Str("a".into()), &Value::I64(1)), Value::Bool(false));
    }

    #[test]
    fn tableaux_semantique_reference() {
        let arr = ValueArray::from(vec![Value::I64(1), Value::I64(2)]);
        let alias = Value::Array(arr.clone());
        arr.set(0, Value::I64(99));
        match alias {
            Value::Array(a) => assert_eq!(a.get(0), Some(Value::I64(99))),
            other => panic!("attendu un tableau, reçu {other:?}"),
        }
    }

    #[test]
    fn decalages_masques() {
        assert_eq!(shl(&Value::I64(1), &Value::I64(3)), Some(Value::I64(8)));
        // compte 64 → masqué à 0
        assert_eq!(shl(&Value::I64(1), &Value::I64(64)), Some(Value::I64(1)));
        assert_eq!(shr(&Value::I64(-8), &Value::I64(1)), Some(Value::I64(-4)));
    }
}
