//! Evaluation of a restricted subset of DWARF expressions, enough to
//! recover member-offset constants and global-variable addresses.
//!
//! Expressions depending on inferior state (registers, memory, frame
//! bases) cannot be computed statically; their results are carried as
//! non-constant stack values so a caller can tell "the value is 8"
//! from "the value is whatever is in register 8".

use constants;
use constants::DwOp;
use endianity::{Endianity, EndianBuf};
use parse::{Error, Result};
use parse::{parse_address, parse_i16, parse_i32, parse_i64, parse_i8,
            parse_signed_leb, parse_u16, parse_u32, parse_u64, parse_u8,
            parse_unsigned_leb};

const MAX_ITERATIONS: usize = 1024;

/// A stack cell: a 64-bit value plus whether it is a known constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackValue {
    value: u64,
    is_constant: bool,
}

impl StackValue {
    fn constant(value: u64) -> StackValue {
        StackValue {
            value: value,
            is_constant: true,
        }
    }

    fn unknown() -> StackValue {
        StackValue {
            value: 0,
            is_constant: false,
        }
    }
}

/// The outcome of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExprResult {
    /// The last constant value observed on the stack, if any.
    pub value: Option<u64>,
    /// Whether a TLS-address operation executed, marking the result as
    /// an offset into the thread-local storage block rather than a
    /// load address.
    pub is_tls_address: bool,
}

/// Evaluate the expression. Unsupported opcodes and inputs the
/// restricted VM cannot compute poison the result to non-constant
/// instead of failing the caller.
pub fn evaluate<Endian>(expr: EndianBuf<Endian>, address_size: u8) -> ExprResult
    where Endian: Endianity
{
    let mut vm = Vm {
        stack: Vec::new(),
        last_constant: None,
        saw_tls: false,
    };
    match vm.run(expr, address_size) {
        Ok(()) => {}
        // Running out of stack items stops evaluation but keeps the
        // last constant observed; producers emit such truncated
        // expressions for member offsets.
        Err(Error::NotEnoughStackItems) => {}
        Err(_) => vm.last_constant = None,
    }
    ExprResult {
        value: vm.last_constant,
        is_tls_address: vm.saw_tls,
    }
}

/// The bit offset encoded by a `DW_AT_data_member_location`
/// expression, or `None` when it is not a compile-time constant.
///
/// The overwhelmingly common shape is a single `DW_OP_plus_uconst N`;
/// that case is answered without instantiating a stack.
pub fn member_offset_in_bits<Endian>(expr: EndianBuf<Endian>,
                                     address_size: u8)
                                     -> Option<u64>
    where Endian: Endianity
{
    if !expr.is_empty() && DwOp(expr[0]) == constants::DW_OP_plus_uconst {
        if let Ok((rest, offset)) = parse_unsigned_leb(expr.range_from(1..)) {
            if rest.is_empty() {
                return Some(offset * 8);
            }
        }
    }
    evaluate(expr, address_size).value.map(|v| v * 8)
}

/// The load address encoded by a `DW_AT_location` expression, plus
/// whether it designates thread-local storage.
pub fn variable_address<Endian>(expr: EndianBuf<Endian>,
                                address_size: u8)
                                -> ExprResult
    where Endian: Endianity
{
    evaluate(expr, address_size)
}

struct Vm {
    stack: Vec<StackValue>,
    last_constant: Option<u64>,
    saw_tls: bool,
}

impl Vm {
    fn push(&mut self, value: StackValue) {
        self.stack.push(value);
        self.note_top();
    }

    fn pop(&mut self) -> Result<StackValue> {
        self.stack.pop().ok_or(Error::NotEnoughStackItems)
    }

    fn peek(&self, depth: usize) -> Result<StackValue> {
        let len = self.stack.len();
        if depth < len {
            Ok(self.stack[len - 1 - depth])
        } else {
            Err(Error::NotEnoughStackItems)
        }
    }

    fn note_top(&mut self) {
        if let Some(top) = self.stack.last() {
            if top.is_constant {
                self.last_constant = Some(top.value);
            }
        }
    }

    fn binary<F>(&mut self, f: F) -> Result<()>
        where F: FnOnce(u64, u64) -> Result<u64>
    {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let value = if lhs.is_constant && rhs.is_constant {
            StackValue::constant(f(lhs.value, rhs.value)?)
        } else {
            StackValue::unknown()
        };
        self.push(value);
        Ok(())
    }

    fn unary<F>(&mut self, f: F) -> Result<()>
        where F: FnOnce(u64) -> u64
    {
        let operand = self.pop()?;
        let value = if operand.is_constant {
            StackValue::constant(f(operand.value))
        } else {
            StackValue::unknown()
        };
        self.push(value);
        Ok(())
    }

    fn run<Endian>(&mut self, expr: EndianBuf<Endian>, address_size: u8) -> Result<()>
        where Endian: Endianity
    {
        let mut pc = 0;
        let mut iterations = 0;

        while pc < expr.len() {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                return Err(Error::TooManyIterations);
            }

            let op = DwOp(expr[pc]);
            let mut input = expr.range_from(pc + 1..);

            if op.is_lit() {
                self.push(StackValue::constant((op.0 - constants::DW_OP_lit0.0) as u64));
                pc = expr.len() - input.len();
                continue;
            }
            if op.is_reg() {
                self.push(StackValue::unknown());
                pc = expr.len() - input.len();
                continue;
            }
            if op.is_breg() {
                let (rest, _) = parse_signed_leb(input)?;
                input = rest;
                self.push(StackValue::unknown());
                pc = expr.len() - input.len();
                continue;
            }

            match op {
                constants::DW_OP_addr => {
                    let (rest, addr) = parse_address(input, address_size)?;
                    input = rest;
                    self.push(StackValue::constant(addr));
                }
                constants::DW_OP_const1u => {
                    let (rest, v) = parse_u8(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_const1s => {
                    let (rest, v) = parse_i8(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_const2u => {
                    let (rest, v) = parse_u16(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_const2s => {
                    let (rest, v) = parse_i16(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_const4u => {
                    let (rest, v) = parse_u32(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_const4s => {
                    let (rest, v) = parse_i32(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_const8u => {
                    let (rest, v) = parse_u64(input)?;
                    input = rest;
                    self.push(StackValue::constant(v));
                }
                constants::DW_OP_const8s => {
                    let (rest, v) = parse_i64(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_constu => {
                    let (rest, v) = parse_unsigned_leb(input)?;
                    input = rest;
                    self.push(StackValue::constant(v));
                }
                constants::DW_OP_consts => {
                    let (rest, v) = parse_signed_leb(input)?;
                    input = rest;
                    self.push(StackValue::constant(v as u64));
                }
                constants::DW_OP_regx => {
                    let (rest, _) = parse_unsigned_leb(input)?;
                    input = rest;
                    self.push(StackValue::unknown());
                }
                constants::DW_OP_fbreg => {
                    let (rest, _) = parse_signed_leb(input)?;
                    input = rest;
                    self.push(StackValue::unknown());
                }
                constants::DW_OP_bregx => {
                    let (rest, _) = parse_unsigned_leb(input)?;
                    let (rest, _) = parse_signed_leb(rest)?;
                    input = rest;
                    self.push(StackValue::unknown());
                }
                constants::DW_OP_dup => {
                    let top = self.peek(0)?;
                    self.push(top);
                }
                constants::DW_OP_drop => {
                    self.pop()?;
                    self.note_top();
                }
                constants::DW_OP_over => {
                    let second = self.peek(1)?;
                    self.push(second);
                }
                constants::DW_OP_pick => {
                    let (rest, depth) = parse_u8(input)?;
                    input = rest;
                    let picked = self.peek(depth as usize)?;
                    self.push(picked);
                }
                constants::DW_OP_swap => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.stack.push(a);
                    self.push(b);
                }
                constants::DW_OP_rot => {
                    let first = self.pop()?;
                    let second = self.pop()?;
                    let third = self.pop()?;
                    self.stack.push(first);
                    self.stack.push(third);
                    self.push(second);
                }
                constants::DW_OP_deref => {
                    self.pop()?;
                    self.push(StackValue::unknown());
                }
                constants::DW_OP_xderef => {
                    self.pop()?;
                    self.pop()?;
                    self.push(StackValue::unknown());
                }
                constants::DW_OP_push_object_address |
                constants::DW_OP_call_frame_cfa => {
                    self.push(StackValue::unknown());
                }
                constants::DW_OP_form_tls_address |
                constants::DW_OP_GNU_push_tls_address => {
                    // The TLS offset stays on the stack; the flag tells
                    // the caller how to interpret it.
                    self.saw_tls = true;
                }
                constants::DW_OP_abs => {
                    self.unary(|v| (v as i64).wrapping_abs() as u64)?;
                }
                constants::DW_OP_and => {
                    self.binary(|l, r| Ok(l & r))?;
                }
                constants::DW_OP_div => {
                    self.binary(|l, r| if r == 0 {
                        Err(Error::DivisionByZero)
                    } else {
                        Ok(((l as i64).wrapping_div(r as i64)) as u64)
                    })?;
                }
                constants::DW_OP_minus => {
                    self.binary(|l, r| Ok(l.wrapping_sub(r)))?;
                }
                constants::DW_OP_mod => {
                    self.binary(|l, r| if r == 0 {
                        Err(Error::DivisionByZero)
                    } else {
                        Ok(l % r)
                    })?;
                }
                constants::DW_OP_mul => {
                    self.binary(|l, r| Ok(l.wrapping_mul(r)))?;
                }
                constants::DW_OP_neg => {
                    self.unary(|v| (v as i64).wrapping_neg() as u64)?;
                }
                constants::DW_OP_not => {
                    self.unary(|v| !v)?;
                }
                constants::DW_OP_or => {
                    self.binary(|l, r| Ok(l | r))?;
                }
                constants::DW_OP_plus => {
                    self.binary(|l, r| Ok(l.wrapping_add(r)))?;
                }
                constants::DW_OP_plus_uconst => {
                    let (rest, addend) = parse_unsigned_leb(input)?;
                    input = rest;
                    let top = self.pop()?;
                    let value = if top.is_constant {
                        StackValue::constant(top.value.wrapping_add(addend))
                    } else {
                        StackValue::unknown()
                    };
                    self.push(value);
                }
                constants::DW_OP_shl => {
                    self.binary(|l, r| Ok(if r >= 64 { 0 } else { l << r }))?;
                }
                constants::DW_OP_shr => {
                    self.binary(|l, r| Ok(if r >= 64 { 0 } else { l >> r }))?;
                }
                constants::DW_OP_shra => {
                    self.binary(|l, r| {
                        Ok(if r >= 64 {
                            if (l as i64) < 0 { !0 } else { 0 }
                        } else {
                            ((l as i64) >> r) as u64
                        })
                    })?;
                }
                constants::DW_OP_xor => {
                    self.binary(|l, r| Ok(l ^ r))?;
                }
                constants::DW_OP_eq => {
                    self.binary(|l, r| Ok((l == r) as u64))?;
                }
                constants::DW_OP_ge => {
                    self.binary(|l, r| Ok(((l as i64) >= (r as i64)) as u64))?;
                }
                constants::DW_OP_gt => {
                    self.binary(|l, r| Ok(((l as i64) > (r as i64)) as u64))?;
                }
                constants::DW_OP_le => {
                    self.binary(|l, r| Ok(((l as i64) <= (r as i64)) as u64))?;
                }
                constants::DW_OP_lt => {
                    self.binary(|l, r| Ok(((l as i64) < (r as i64)) as u64))?;
                }
                constants::DW_OP_ne => {
                    self.binary(|l, r| Ok((l != r) as u64))?;
                }
                constants::DW_OP_skip => {
                    let (rest, offset) = parse_i16(input)?;
                    input = rest;
                    pc = branch_target(expr.len(), expr.len() - input.len(), offset)?;
                    continue;
                }
                constants::DW_OP_bra => {
                    let (rest, offset) = parse_i16(input)?;
                    input = rest;
                    let condition = self.pop()?;
                    self.note_top();
                    if !condition.is_constant {
                        // The branch cannot be decided statically.
                        return Err(Error::UnsupportedOpcode(op));
                    }
                    if condition.value != 0 {
                        pc = branch_target(expr.len(), expr.len() - input.len(), offset)?;
                        continue;
                    }
                }
                constants::DW_OP_call2 => {
                    let (rest, _) = parse_u16(input)?;
                    input = rest;
                }
                constants::DW_OP_call4 => {
                    let (rest, _) = parse_u32(input)?;
                    input = rest;
                }
                constants::DW_OP_call_ref => {
                    let (rest, _) = parse_address(input, address_size)?;
                    input = rest;
                }
                constants::DW_OP_nop => {}
                otherwise => return Err(Error::UnsupportedOpcode(otherwise)),
            }

            pc = expr.len() - input.len();
        }

        Ok(())
    }
}

fn branch_target(len: usize, after_operand: usize, offset: i16) -> Result<usize> {
    let target = after_operand as i64 + offset as i64;
    if target < 0 || target as usize > len {
        Err(Error::BadBranchTarget(after_operand))
    } else {
        Ok(target as usize)
    }
}
