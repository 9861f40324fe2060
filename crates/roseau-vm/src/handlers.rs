//! Table de dispatch des opcodes et leurs handlers.
//!
//! Un handler par opcode, sans état, derrière une capacité unique :
//! `fn(&mut Context, &Instruction) -> VmResult<()>`. La table est
//! construite une fois au premier usage puis partagée en lecture seule
//! entre toutes les activations. Toute mutation passe par la pile, les
//! slots, ou les effets du résolveur hôte.
//!
//! Les ordres de dépilement irréguliers (`Sub`, `Div`, `Rem`, `Shr`,
//! `Clt`, `Cgt`) sont porteurs de sens : chaque programme déjà traduit
//! en dépend. Ne pas les « corriger ».

use std::collections::HashMap;
use std::sync::OnceLock;

use roseau_core::value::{self, ByteArray, HandleValue};
use roseau_core::{Instruction, OpCode, Value};

use crate::context::Context;
use crate::error::{VmError, VmResult};
use crate::host::{pop_call_args, HostCallable, SymbolKind};

/// Capacité unique d'un handler d'opcode.
pub type Handler = fn(&mut Context<'_>, &Instruction) -> VmResult<()>;

/// Exécute une instruction via la table de dispatch.
pub fn execute(ctx: &mut Context<'_>, instruction: &Instruction) -> VmResult<()> {
    let handler = table().get(&instruction.opcode()).ok_or_else(|| VmError::BadOperand {
        opcode: instruction.opcode().name(),
        detail: "opcode sans handler".into(),
    })?;
    handler(ctx, instruction)
}

/// Table immuable opcode → handler, construite au premier accès.
fn table() -> &'static HashMap<OpCode, Handler> {
    static TABLE: OnceLock<HashMap<OpCode, Handler>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t: HashMap<OpCode, Handler> = HashMap::new();
        // multiplexés par préfixe d'opérande
        t.insert(OpCode::HxCall, hx_call);
        t.insert(OpCode::HxLdc, ldc);
        t.insert(OpCode::HxArray, hx_array);
        t.insert(OpCode::HxLoc, hx_loc);
        t.insert(OpCode::HxArg, hx_arg);
        t.insert(OpCode::HxFld, hx_fld);
        t.insert(OpCode::HxConv, hx_conv);
        // jeu de base
        t.insert(OpCode::Or, or);
        t.insert(OpCode::Null, ldnull);
        t.insert(OpCode::Newarr, newarr);
        t.insert(OpCode::Ldnull, ldnull);
        t.insert(OpCode::Ldloca, ldloca);
        t.insert(OpCode::Ldlen, ldlen);
        t.insert(OpCode::LdelemU1, ldelem_u1);
        t.insert(OpCode::Ldc, ldc);
        t.insert(OpCode::ConvU1, conv_u1);
        t.insert(OpCode::ConvI4, conv_i4);
        t.insert(OpCode::Cmp, ceq);
        t.insert(OpCode::Clt, clt);
        t.insert(OpCode::Cgt, cgt);
        t.insert(OpCode::Neg, neg);
        t.insert(OpCode::Not, not);
        t.insert(OpCode::And, and);
        t.insert(OpCode::Shr, shr);
        t.insert(OpCode::Shl, shl);
        t.insert(OpCode::Xor, xor);
        t.insert(OpCode::Rem, rem);
        t.insert(OpCode::Ceq, ceq);
        t.insert(OpCode::Mul, mul);
        t.insert(OpCode::Nop, nop);
        t.insert(OpCode::Add, add);
        t.insert(OpCode::Sub, sub);
        t.insert(OpCode::Ret, ret);
        t.insert(OpCode::Pop, pop);
        t.insert(OpCode::Len, len);
        t.insert(OpCode::Dup, dup);
        t.insert(OpCode::Div, div);
        t.insert(OpCode::Ldtoken, ldtoken);
        t.insert(OpCode::Br, br);
        t.insert(OpCode::Brtrue, brtrue);
        t.insert(OpCode::Brfalse, brfalse);
        t.insert(OpCode::Box, boxing);
        t.insert(OpCode::Newobj, newobj);
        t.insert(OpCode::ConvR4, conv_r4);
        t.insert(OpCode::ConvR8, conv_r8);
        t
    })
}

/* ─────────────────────────── Aides opérandes ─────────────────────────── */

fn bad(opcode: &'static str, detail: impl Into<String>) -> VmError {
    VmError::BadOperand { opcode, detail: detail.into() }
}

fn text_operand(instr: &Instruction, opcode: &'static str) -> VmResult<String> {
    let text = instr.operand_text();
    if text.is_empty() {
        return Err(bad(opcode, "opérande requis"));
    }
    Ok(text)
}

fn int_operand(instr: &Instruction, opcode: &'static str) -> VmResult<i64> {
    instr
        .operand()
        .and_then(Value::as_i64)
        .ok_or_else(|| bad(opcode, "opérande entier requis"))
}

/// Scinde `<chiffre de préfixe><reste>`.
fn split_prefix<'a>(text: &'a str, opcode: &'static str) -> VmResult<(u32, &'a str)> {
    let mut chars = text.chars();
    let prefix = chars
        .next()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| bad(opcode, format!("préfixe manquant: {text:?}")))?;
    Ok((prefix, chars.as_str()))
}

fn parse_token(text: &str, opcode: &'static str) -> VmResult<i64> {
    text.parse().map_err(|_| bad(opcode, format!("jeton non décimal: {text:?}")))
}

fn parse_index(text: &str, opcode: &'static str) -> VmResult<usize> {
    text.parse().map_err(|_| bad(opcode, format!("index non décimal: {text:?}")))
}

fn numeric(result: Option<Value>, opcode: &'static str) -> VmResult<Value> {
    result.ok_or_else(|| bad(opcode, "opérandes non numériques"))
}

/// Comme [`numeric`], mais distingue l'échec arithmétique sur opérandes
/// pourtant numériques (division par zéro, débordement entier).
fn arith(result: Option<Value>, operands: &[&Value], opcode: &'static str) -> VmResult<Value> {
    result.ok_or_else(|| {
        if operands.iter().all(|v| v.as_num().is_some()) {
            bad(opcode, "division par zéro ou débordement")
        } else {
            bad(opcode, "opérandes non numériques")
        }
    })
}

fn pop_usize(ctx: &mut Context<'_>, opcode: &'static str) -> VmResult<usize> {
    let value = ctx.stack.pop()?;
    value
        .as_i64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| bad(opcode, format!("index invalide: {value:?}")))
}

/* ─────────────────────────── Arithmétique et logique ─────────────────────────── */

fn add(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(arith(value::add(&x, &y), &[&x, &y], "Add")?);
    Ok(())
}

// `Sub` pousse sommet − second.
fn sub(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let y = ctx.stack.pop()?;
    let x = ctx.stack.pop()?;
    ctx.stack.push(arith(value::sub(&y, &x), &[&y, &x], "Sub")?);
    Ok(())
}

fn mul(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(arith(value::mul(&x, &y), &[&x, &y], "Mul")?);
    Ok(())
}

// `Div` pousse second ÷ sommet.
fn div(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let first = ctx.stack.pop()?;
    let second = ctx.stack.pop()?;
    ctx.stack.push(arith(value::div(&second, &first), &[&second, &first], "Div")?);
    Ok(())
}

// `Rem` pousse sommet % second.
fn rem(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(arith(value::rem(&x, &y), &[&x, &y], "Rem")?);
    Ok(())
}

fn and(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::bit_and(&y, &x), "And")?);
    Ok(())
}

fn or(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::bit_or(&y, &x), "Or")?);
    Ok(())
}

fn xor(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::bit_xor(&y, &x), "Xor")?);
    Ok(())
}

// `Shl`/`Shr` décalent le sommet du compte posé dessous.
fn shl(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::shl(&x, &y), "Shl")?);
    Ok(())
}

fn shr(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::shr(&x, &y), "Shr")?);
    Ok(())
}

fn neg(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    ctx.stack.push(arith(value::neg(&x), &[&x], "Neg")?);
    Ok(())
}

fn not(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::bit_not(&x), "Not")?);
    Ok(())
}

/* ─────────────────────────── Comparaisons ─────────────────────────── */

// `Clt`/`Cgt` comparent sommet à second (dans cet ordre).
fn clt(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::lt(&x, &y), "Clt")?);
    Ok(())
}

fn cgt(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(numeric(value::gt(&x, &y), "Cgt")?);
    Ok(())
}

fn ceq(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let x = ctx.stack.pop()?;
    let y = ctx.stack.pop()?;
    ctx.stack.push(value::eq(&x, &y));
    Ok(())
}

/* ─────────────────────────── Pile et divers ─────────────────────────── */

fn dup(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let top = ctx.stack.peek()?.clone();
    ctx.stack.push(top);
    Ok(())
}

fn pop(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    ctx.stack.pop()?;
    Ok(())
}

fn nop(_: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    Ok(())
}

// marque le résultat : repousse le sommet, ou `Null` sur pile vide
fn ret(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = if ctx.stack.is_empty() { Value::Null } else { ctx.stack.pop()? };
    ctx.stack.push(value);
    Ok(())
}

// le modèle de valeurs porte déjà le type : boxer est structurellement
// neutre, l'opérande (nom de type) est informatif
fn boxing(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = ctx.stack.pop()?;
    ctx.stack.push(value);
    Ok(())
}

// adresse et valeur ne sont pas distinguées
fn ldloca(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = ctx.stack.pop()?;
    ctx.stack.push(value);
    Ok(())
}

fn ldnull(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    ctx.stack.push(Value::Null);
    Ok(())
}

fn ldc(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    ctx.stack.push(instr.operand().cloned().unwrap_or(Value::Null));
    Ok(())
}

/* ─────────────────────────── Branchements ─────────────────────────── */

fn br(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let target = int_operand(instr, "Br")?;
    ctx.jump_to(target);
    Ok(())
}

fn brtrue(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let target = int_operand(instr, "Brtrue")?;
    let value = ctx.stack.pop()?;
    let truth = value.truth().ok_or_else(|| bad("Brtrue", format!("condition non numérique: {value:?}")))?;
    if truth == 1 {
        ctx.jump_to(target);
    }
    Ok(())
}

fn brfalse(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let target = int_operand(instr, "Brfalse")?;
    let value = ctx.stack.pop()?;
    let truth = value.truth().ok_or_else(|| bad("Brfalse", format!("condition non numérique: {value:?}")))?;
    if truth == 0 {
        ctx.jump_to(target);
    }
    Ok(())
}

/* ─────────────────────────── Conversions ─────────────────────────── */

fn conv_i4(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = ctx.stack.pop()?;
    let converted = value.as_i64().ok_or_else(|| bad("ConvI4", format!("{value:?}")))?;
    ctx.stack.push(Value::I64(converted));
    Ok(())
}

fn conv_u1(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = ctx.stack.pop()?;
    let byte = value
        .as_i64()
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| bad("ConvU1", format!("hors plage octet: {value:?}")))?;
    ctx.stack.push(Value::I64(i64::from(byte)));
    Ok(())
}

fn conv_r4(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = ctx.stack.pop()?;
    let converted = value.as_f32().ok_or_else(|| bad("ConvR4", format!("{value:?}")))?;
    ctx.stack.push(Value::F32(converted));
    Ok(())
}

fn conv_r8(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let value = ctx.stack.pop()?;
    let converted = value.as_f64().ok_or_else(|| bad("ConvR8", format!("{value:?}")))?;
    ctx.stack.push(Value::F64(converted));
    Ok(())
}

fn hx_conv(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let id = int_operand(instr, "HxConv")?;
    match id {
        0 => conv_r4(ctx, instr),
        1 => conv_r8(ctx, instr),
        other => Err(bad("HxConv", format!("id de conversion inconnu: {other}"))),
    }
}

/* ─────────────────────────── Tableaux ─────────────────────────── */

// toujours un tableau d'octets, quel que soit le type d'élément déclaré
fn newarr(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let count = pop_usize(ctx, "Newarr")?;
    ctx.stack.push(Value::Bytes(ByteArray::zeroed(count)));
    Ok(())
}

fn ldlen(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    match ctx.stack.pop()? {
        Value::Bytes(bytes) => {
            ctx.stack.push(Value::I64(bytes.len() as i64));
            Ok(())
        }
        other => Err(bad("Ldlen", format!("tableau d'octets attendu, reçu {other:?}"))),
    }
}

fn ldelem_u1(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let index = pop_usize(ctx, "LdelemU1")?;
    match ctx.stack.pop()? {
        Value::Bytes(bytes) => {
            let byte = bytes
                .get(index)
                .ok_or_else(|| bad("LdelemU1", format!("index hors bornes: {index}")))?;
            ctx.stack.push(Value::I64(i64::from(byte)));
            Ok(())
        }
        other => Err(bad("LdelemU1", format!("tableau d'octets attendu, reçu {other:?}"))),
    }
}

// `Len` accepte les deux sortes de tableaux
fn len(ctx: &mut Context<'_>, _: &Instruction) -> VmResult<()> {
    let length = match ctx.stack.pop()? {
        Value::Bytes(bytes) => bytes.len(),
        Value::Array(values) => values.len(),
        other => return Err(bad("Len", format!("tableau attendu, reçu {other:?}"))),
    };
    ctx.stack.push(Value::I64(length as i64));
    Ok(())
}

fn hx_array(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    match int_operand(instr, "HxArray")? {
        // charge : index puis tableau
        0 => {
            let index = pop_usize(ctx, "HxArray")?;
            let element = match ctx.stack.pop()? {
                Value::Array(values) => values
                    .get(index)
                    .ok_or_else(|| bad("HxArray", format!("index hors bornes: {index}")))?,
                Value::Bytes(bytes) => Value::I64(i64::from(
                    bytes.get(index).ok_or_else(|| bad("HxArray", format!("index hors bornes: {index}")))?,
                )),
                other => return Err(bad("HxArray", format!("tableau attendu, reçu {other:?}"))),
            };
            ctx.stack.push(element);
            Ok(())
        }
        // range : valeur, index, puis tableau
        1 => {
            let value = ctx.stack.pop()?;
            let index = pop_usize(ctx, "HxArray")?;
            let stored = match ctx.stack.pop()? {
                Value::Array(values) => values.set(index, value),
                Value::Bytes(bytes) => {
                    let byte = value
                        .as_i64()
                        .and_then(|i| u8::try_from(i).ok())
                        .ok_or_else(|| bad("HxArray", format!("octet attendu, reçu {value:?}")))?;
                    bytes.set(index, byte)
                }
                other => return Err(bad("HxArray", format!("tableau attendu, reçu {other:?}"))),
            };
            if stored {
                Ok(())
            } else {
                Err(bad("HxArray", format!("index hors bornes: {index}")))
            }
        }
        other => Err(bad("HxArray", format!("préfixe inconnu: {other}"))),
    }
}

/* ─────────────────────────── Slots ─────────────────────────── */

fn hx_loc(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let text = text_operand(instr, "HxLoc")?;
    let (prefix, rest) = split_prefix(&text, "HxLoc")?;
    let index = parse_index(rest, "HxLoc")?;
    match prefix {
        0 => {
            let value = ctx.locals.get(index);
            ctx.stack.push(value);
            Ok(())
        }
        1 => {
            let value = ctx.stack.pop()?;
            ctx.locals.set(index, value);
            Ok(())
        }
        other => Err(bad("HxLoc", format!("préfixe inconnu: {other}"))),
    }
}

fn hx_arg(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let text = text_operand(instr, "HxArg")?;
    let (prefix, rest) = split_prefix(&text, "HxArg")?;
    let index = parse_index(rest, "HxArg")?;
    match prefix {
        0 => {
            let value = ctx.args.get(index);
            ctx.stack.push(value);
            Ok(())
        }
        1 => {
            let value = ctx.stack.pop()?;
            ctx.args.set(index, value);
            Ok(())
        }
        other => Err(bad("HxArg", format!("préfixe inconnu: {other}"))),
    }
}

/* ─────────────────────────── Symboles hôtes ─────────────────────────── */

/// Invoque sans receveur (constructeurs).
fn invoke_ctor(ctx: &mut Context<'_>, callable: &dyn HostCallable) -> VmResult<()> {
    let args = pop_call_args(&mut ctx.stack, callable.params())?;
    if let Some(result) = callable.invoke(None, args).map_err(VmError::Host)? {
        ctx.stack.push(result);
    }
    Ok(())
}

/// Invoque avec receveur éventuel : les paramètres sont dépilés d'abord,
/// le receveur (posé avant eux) ensuite.
fn invoke_with_receiver(ctx: &mut Context<'_>, callable: &dyn HostCallable) -> VmResult<()> {
    let args = pop_call_args(&mut ctx.stack, callable.params())?;
    let target = if callable.is_static() { None } else { Some(ctx.stack.pop()?) };
    if let Some(result) = callable.invoke(target, args).map_err(VmError::Host)? {
        ctx.stack.push(result);
    }
    Ok(())
}

fn newobj(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let token = int_operand(instr, "Newobj")?;
    let ctor = ctx
        .resolver()
        .resolve_constructor(token)
        .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Constructor, token })?;
    invoke_ctor(ctx, ctor.as_ref())
}

fn hx_call(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let text = text_operand(instr, "HxCall")?;
    // 1er chiffre : dispatch virtuel ou non — porté sur le fil, ignoré ici
    let (_dispatch, rest) = split_prefix(&text, "HxCall")?;
    let (kind, rest) = split_prefix(rest, "HxCall")?;
    let token = parse_token(rest, "HxCall")?;
    match kind {
        0 => {
            let ctor = ctx
                .resolver()
                .resolve_constructor(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Constructor, token })?;
            invoke_ctor(ctx, ctor.as_ref())
        }
        1 => {
            let method = ctx
                .resolver()
                .resolve_method(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Method, token })?;
            invoke_with_receiver(ctx, method.as_ref())
        }
        2 => {
            let member = ctx
                .resolver()
                .resolve_member(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::MemberRef, token })?;
            invoke_with_receiver(ctx, member.as_ref())
        }
        other => Err(bad("HxCall", format!("nature d'appel inconnue: {other}"))),
    }
}

// Préfixes à l'exécution : 0 méthode, 1 membre, 2 type, 3 champ.
// Le traducteur émet 2=champ/3=type ; le désaccord est historique et
// chaque programme déjà traduit l'embarque — reproduire tel quel.
fn ldtoken(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let text = text_operand(instr, "Ldtoken")?;
    let (prefix, rest) = split_prefix(&text, "Ldtoken")?;
    let token = parse_token(rest, "Ldtoken")?;
    let handle = match prefix {
        0 => {
            let method = ctx
                .resolver()
                .resolve_method(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Method, token })?;
            Value::Handle(HandleValue::new(method))
        }
        1 => {
            let member = ctx
                .resolver()
                .resolve_member(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::MemberRef, token })?;
            Value::Handle(HandleValue::new(member))
        }
        2 => {
            let ty = ctx
                .resolver()
                .resolve_type(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Type, token })?;
            Value::Handle(ty)
        }
        3 => {
            let field = ctx
                .resolver()
                .resolve_field(token)
                .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Field, token })?;
            Value::Handle(HandleValue::new(field))
        }
        other => return Err(bad("Ldtoken", format!("préfixe inconnu: {other}"))),
    };
    ctx.stack.push(handle);
    Ok(())
}

fn hx_fld(ctx: &mut Context<'_>, instr: &Instruction) -> VmResult<()> {
    let text = text_operand(instr, "HxFld")?;
    let (prefix, rest) = split_prefix(&text, "HxFld")?;
    let token = parse_token(rest, "HxFld")?;
    let field = ctx
        .resolver()
        .resolve_field(token)
        .ok_or(VmError::UnknownSymbol { kind: SymbolKind::Field, token })?;
    let value = match prefix {
        // champ d'instance : le receveur est au sommet
        0 => {
            let instance = ctx.stack.pop()?;
            field.read(Some(instance)).map_err(VmError::Host)?
        }
        // champ statique : rien à dépiler
        1 => field.read(None).map_err(VmError::Host)?,
        other => return Err(bad("HxFld", format!("préfixe inconnu: {other}"))),
    };
    ctx.stack.push(value);
    Ok(())
}

/* --------------------------------- Tests --------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::host::{HostField, NullResolver, ParamSpec, SymbolResolver};
    use pretty_assertions::assert_eq;
    use roseau_core::Program;
    use std::sync::Arc;

    fn run(instrs: Vec<Instruction>) -> VmResult<Value> {
        run_with(instrs, Vec::new(), &NullResolver)
    }

    fn run_with(
        instrs: Vec<Instruction>,
        args: Vec<Value>,
        resolver: &dyn SymbolResolver,
    ) -> VmResult<Value> {
        let program = Program::from(instrs);
        Context::new(args, resolver).run(&program)
    }

    fn ldc(v: impl Into<Value>) -> Instruction {
        Instruction::new(OpCode::Ldc, v)
    }

    #[test]
    fn div_ordre_documente() {
        // 10 poussé puis 3 : Div rend second ÷ sommet = 10 / 3 = 3
        let result = run(vec![ldc(10i64), ldc(3i64), Instruction::bare(OpCode::Div)]).unwrap();
        assert_eq!(result, Value::I64(3));
    }

    #[test]
    fn sub_ordre_documente() {
        // 10 poussé puis 3 : Sub rend sommet − second = 3 − 10 = −7
        let result = run(vec![ldc(10i64), ldc(3i64), Instruction::bare(OpCode::Sub)]).unwrap();
        assert_eq!(result, Value::I64(-7));
    }

    #[test]
    fn shr_ordre_documente() {
        // 16 poussé puis 2 : Shr décale le sommet du compte dessous → 2 >> 16
        let result = run(vec![ldc(2i64), ldc(16i64), Instruction::bare(OpCode::Shr)]).unwrap();
        assert_eq!(result, Value::I64(16 >> 2));
    }

    #[test]
    fn clt_compare_sommet_a_second() {
        // 5 poussé puis 3 : Clt rend sommet < second = 3 < 5
        let result = run(vec![ldc(5i64), ldc(3i64), Instruction::bare(OpCode::Clt)]).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn discipline_de_pile() {
        // N pushes suivis de N pops laissent la pile vide → résultat Null
        let mut instrs = Vec::new();
        for i in 0..4i64 {
            instrs.push(ldc(i));
        }
        for _ in 0..4 {
            instrs.push(Instruction::bare(OpCode::Pop));
        }
        assert_eq!(run(instrs).unwrap(), Value::Null);
        // pop sur pile vide → StackUnderflow
        assert_eq!(run(vec![Instruction::bare(OpCode::Pop)]), Err(VmError::StackUnderflow));
    }

    #[test]
    fn echec_arithmetique_diagnostique() {
        // division par zéro : opérandes numériques, détail dédié
        let err = run(vec![ldc(10i64), ldc(0i64), Instruction::bare(OpCode::Div)]).unwrap_err();
        assert_eq!(
            err,
            VmError::BadOperand { opcode: "Div", detail: "division par zéro ou débordement".into() }
        );
        // débordement entier, même diagnostic
        let err =
            run(vec![ldc(i64::MAX), ldc(1i64), Instruction::bare(OpCode::Add)]).unwrap_err();
        assert_eq!(
            err,
            VmError::BadOperand { opcode: "Add", detail: "division par zéro ou débordement".into() }
        );
        // opérande non numérique : l'ancien détail reste
        let err = run(vec![ldc("abc"), ldc(2i64), Instruction::bare(OpCode::Div)]).unwrap_err();
        assert_eq!(
            err,
            VmError::BadOperand { opcode: "Div", detail: "opérandes non numériques".into() }
        );
    }

    #[test]
    fn ret_sur_pile_vide() {
        assert_eq!(run(vec![Instruction::bare(OpCode::Ret)]).unwrap(), Value::Null);
    }

    #[test]
    fn newarr_et_longueurs_coherentes() {
        // Newarr rend toujours un tableau d'octets ; Ldlen et Len
        // mesurent le même tableau pareil
        let result = run(vec![
            ldc(8i64),
            Instruction::bare(OpCode::Newarr),
            Instruction::bare(OpCode::Dup),
            Instruction::bare(OpCode::Ldlen),
        ])
        .unwrap();
        assert_eq!(result, Value::I64(8));

        let result = run(vec![
            ldc(8i64),
            Instruction::bare(OpCode::Newarr),
            Instruction::bare(OpCode::Len),
        ])
        .unwrap();
        assert_eq!(result, Value::I64(8));
    }

    #[test]
    fn tableau_octets_ecrit_puis_relu() {
        // arr[2] = 7 via HxArray(1), relu via LdelemU1 et HxArray(0)
        let result = run(vec![
            ldc(4i64),
            Instruction::bare(OpCode::Newarr),
            Instruction::bare(OpCode::Dup),
            Instruction::bare(OpCode::Dup),
            ldc(2i64),
            ldc(7i64),
            Instruction::new(OpCode::HxArray, 1i64),
            ldc(2i64),
            Instruction::bare(OpCode::LdelemU1),
        ])
        .unwrap();
        assert_eq!(result, Value::I64(7));
    }

    #[test]
    fn ldlen_refuse_autre_chose_qu_octets() {
        let program = vec![ldc(1i64), Instruction::bare(OpCode::Ldlen)];
        assert!(matches!(run(program), Err(VmError::BadOperand { opcode: "Ldlen", .. })));
    }

    #[test]
    fn slots_via_prefixes() {
        // local 3 ← 42 puis relu
        let result = run(vec![
            ldc(42i64),
            Instruction::new(OpCode::HxLoc, "13"),
            Instruction::new(OpCode::HxLoc, "03"),
        ])
        .unwrap();
        assert_eq!(result, Value::I64(42));

        // argument 1 relu puis récrit
        let args = vec![Value::I64(5), Value::Str("b".into())];
        let result = run_with(
            vec![Instruction::new(OpCode::HxArg, "01")],
            args.clone(),
            &NullResolver,
        )
        .unwrap();
        assert_eq!(result, Value::Str("b".into()));

        let result = run_with(
            vec![
                ldc(9i64),
                Instruction::new(OpCode::HxArg, "10"),
                Instruction::new(OpCode::HxArg, "00"),
            ],
            args,
            &NullResolver,
        )
        .unwrap();
        assert_eq!(result, Value::I64(9));
    }

    #[test]
    fn conversions() {
        let result = run(vec![ldc("37"), Instruction::bare(OpCode::ConvI4)]).unwrap();
        assert_eq!(result, Value::I64(37));
        let result = run(vec![ldc(2i64), Instruction::new(OpCode::HxConv, 1i64)]).unwrap();
        assert_eq!(result, Value::F64(2.0));
        let result = run(vec![ldc(2i64), Instruction::new(OpCode::HxConv, 0i64)]).unwrap();
        assert_eq!(result, Value::F32(2.0));
        assert!(run(vec![ldc(300i64), Instruction::bare(OpCode::ConvU1)]).is_err());
    }

    /* ---- résolveur de test ---- */

    struct Adder;

    impl HostCallable for Adder {
        fn params(&self) -> &[ParamSpec] {
            const PARAMS: &[ParamSpec] = &[ParamSpec::I64, ParamSpec::I64];
            PARAMS
        }

        fn invoke(&self, _target: Option<Value>, args: Vec<Value>) -> Result<Option<Value>, String> {
            let (a, b) = (&args[0], &args[1]);
            match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Ok(Some(Value::I64(a + b))),
                _ => Err("arguments non entiers".into()),
            }
        }
    }

    struct Doubler;

    impl HostCallable for Doubler {
        fn is_static(&self) -> bool {
            false
        }

        fn params(&self) -> &[ParamSpec] {
            &[]
        }

        fn invoke(&self, target: Option<Value>, _args: Vec<Value>) -> Result<Option<Value>, String> {
            let receiver = target.ok_or("receveur manquant")?;
            let i = receiver.as_i64().ok_or("receveur non entier")?;
            Ok(Some(Value::I64(i * 2)))
        }
    }

    struct StaticField;

    impl HostField for StaticField {
        fn read(&self, instance: Option<Value>) -> Result<Value, String> {
            match instance {
                None => Ok(Value::Str("statique".into())),
                Some(v) => Ok(Value::Str(format!("instance:{v}"))),
            }
        }
    }

    struct TestResolver;

    impl SymbolResolver for TestResolver {
        fn resolve_constructor(&self, token: i64) -> Option<Arc<dyn HostCallable>> {
            (token == 7).then(|| Arc::new(Adder) as Arc<dyn HostCallable>)
        }
        fn resolve_method(&self, token: i64) -> Option<Arc<dyn HostCallable>> {
            match token {
                1 => Some(Arc::new(Adder)),
                2 => Some(Arc::new(Doubler)),
                _ => None,
            }
        }
        fn resolve_member(&self, token: i64) -> Option<Arc<dyn HostCallable>> {
            (token == 3).then(|| Arc::new(Adder) as Arc<dyn HostCallable>)
        }
        fn resolve_field(&self, token: i64) -> Option<Arc<dyn HostField>> {
            (token == 9).then(|| Arc::new(StaticField) as Arc<dyn HostField>)
        }
        fn resolve_type(&self, token: i64) -> Option<HandleValue> {
            (token == 4).then(|| HandleValue::new("un-type"))
        }
    }

    #[test]
    fn appel_statique_coerce_les_parametres() {
        // les paramètres arrivent en texte filaire et sont coercés
        let result = run_with(
            vec![ldc("4"), ldc("2"), Instruction::new(OpCode::HxCall, "111")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert_eq!(result, Value::I64(6));
    }

    #[test]
    fn appel_instance_depile_le_receveur_apres() {
        // receveur 21 poussé avant les paramètres (aucun ici)
        let result = run_with(
            vec![ldc(21i64), Instruction::new(OpCode::HxCall, "012")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert_eq!(result, Value::I64(42));
    }

    #[test]
    fn construction_par_jeton() {
        let result = run_with(
            vec![ldc(40i64), ldc(2i64), Instruction::new(OpCode::Newobj, 7i64)],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert_eq!(result, Value::I64(42));
    }

    #[test]
    fn champ_statique_et_d_instance() {
        let result = run_with(
            vec![Instruction::new(OpCode::HxFld, "19")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert_eq!(result, Value::Str("statique".into()));

        let result = run_with(
            vec![ldc(5i64), Instruction::new(OpCode::HxFld, "09")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert_eq!(result, Value::Str("instance:5".into()));
    }

    #[test]
    fn ldtoken_pousse_une_poignee() {
        let result = run_with(
            vec![Instruction::new(OpCode::Ldtoken, "01")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert!(matches!(result, Value::Handle(_)));
        // préfixe 2 = type à l'exécution
        let result = run_with(
            vec![Instruction::new(OpCode::Ldtoken, "24")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap();
        assert!(matches!(result, Value::Handle(_)));
    }

    #[test]
    fn symbole_introuvable_fatal() {
        let err = run_with(
            vec![Instruction::new(OpCode::HxCall, "11999")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap_err();
        assert_eq!(err, VmError::UnknownSymbol { kind: SymbolKind::Method, token: 999 });
    }

    #[test]
    fn coercition_impossible_fatale() {
        let err = run_with(
            vec![ldc("abc"), ldc("2"), Instruction::new(OpCode::HxCall, "111")],
            Vec::new(),
            &TestResolver,
        )
        .unwrap_err();
        assert_eq!(err, VmError::ParameterCoercion { expected: "i64", got: "str" });
    }
}
