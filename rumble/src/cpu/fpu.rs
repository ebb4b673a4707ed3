//! COP1 arithmetic: the `S`, `D`, `W` and `L` formats.

use super::Interpreter;
use rumble_core::cpu::{
    cop1::{Cop1, RoundingMode},
    instr::{FpuOpcode, Instruction},
};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A floating point format of the FPU.
trait Float:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn read(cop1: &Cop1, index: usize) -> Self;
    fn write(self, cop1: &mut Cop1, index: usize);

    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
    fn is_nan(self) -> bool;
    fn round_ties_even(self) -> Self;
    fn trunc(self) -> Self;
    fn ceil(self) -> Self;
    fn floor(self) -> Self;
    fn round_with(self, mode: RoundingMode) -> Self;

    fn to_f32(self) -> f32;
    fn to_f64(self) -> f64;
    fn to_i32(self) -> i32;
    fn to_i64(self) -> i64;
}

macro_rules! impl_float {
    ($type:ty, $read:ident, $write:ident, $round:ident) => {
        impl Float for $type {
            #[inline(always)]
            fn read(cop1: &Cop1, index: usize) -> Self {
                cop1.$read(index)
            }

            #[inline(always)]
            fn write(self, cop1: &mut Cop1, index: usize) {
                cop1.$write(index, self);
            }

            fn sqrt(self) -> Self {
                <$type>::sqrt(self)
            }

            fn abs(self) -> Self {
                <$type>::abs(self)
            }

            fn is_nan(self) -> bool {
                <$type>::is_nan(self)
            }

            fn round_ties_even(self) -> Self {
                <$type>::round_ties_even(self)
            }

            fn trunc(self) -> Self {
                <$type>::trunc(self)
            }

            fn ceil(self) -> Self {
                <$type>::ceil(self)
            }

            fn floor(self) -> Self {
                <$type>::floor(self)
            }

            fn round_with(self, mode: RoundingMode) -> Self {
                mode.$round(self)
            }

            fn to_f32(self) -> f32 {
                self as f32
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i32(self) -> i32 {
                self as i32
            }

            fn to_i64(self) -> i64 {
                self as i64
            }
        }
    };
}

impl_float!(f32, read_f32, write_f32, round_f32);
impl_float!(f64, read_f64, write_f64, round_f64);

/// Bits of the condition field of a compare.
mod condition {
    pub const UNORDERED: u32 = 1 << 0;
    pub const EQUAL: u32 = 1 << 1;
    pub const LESS: u32 = 1 << 2;
}

impl Interpreter<'_> {
    pub(super) fn exec_single(&mut self, instr: Instruction) {
        self.exec_float::<f32>(instr);
    }

    pub(super) fn exec_double(&mut self, instr: Instruction) {
        self.exec_float::<f64>(instr);
    }

    fn exec_float<F: Float>(&mut self, instr: Instruction) {
        let Some(op) = instr.fpu_op() else {
            self.not_implemented(instr);
            return;
        };

        let cop1 = &mut self.machine.cop1;
        let fs = F::read(cop1, instr.fs_index());
        let ft = F::read(cop1, instr.ft_index());
        let fd = instr.fd_index();

        match op {
            FpuOpcode::ADD => (fs + ft).write(cop1, fd),
            FpuOpcode::SUB => (fs - ft).write(cop1, fd),
            FpuOpcode::MUL => (fs * ft).write(cop1, fd),
            FpuOpcode::DIV => (fs / ft).write(cop1, fd),
            FpuOpcode::SQRT => fs.sqrt().write(cop1, fd),
            FpuOpcode::ABS => fs.abs().write(cop1, fd),
            FpuOpcode::MOV => fs.write(cop1, fd),
            FpuOpcode::NEG => (-fs).write(cop1, fd),
            FpuOpcode::ROUND_L => cop1.write_double(fd, fs.round_ties_even().to_i64() as u64),
            FpuOpcode::TRUNC_L => cop1.write_double(fd, fs.trunc().to_i64() as u64),
            FpuOpcode::CEIL_L => cop1.write_double(fd, fs.ceil().to_i64() as u64),
            FpuOpcode::FLOOR_L => cop1.write_double(fd, fs.floor().to_i64() as u64),
            FpuOpcode::ROUND_W => cop1.write_single(fd, fs.round_ties_even().to_i32() as u32),
            FpuOpcode::TRUNC_W => cop1.write_single(fd, fs.trunc().to_i32() as u32),
            FpuOpcode::CEIL_W => cop1.write_single(fd, fs.ceil().to_i32() as u32),
            FpuOpcode::FLOOR_W => cop1.write_single(fd, fs.floor().to_i32() as u32),
            FpuOpcode::CVT_S => cop1.write_f32(fd, fs.to_f32()),
            FpuOpcode::CVT_D => cop1.write_f64(fd, fs.to_f64()),
            FpuOpcode::CVT_W => {
                let mode = cop1.rounding_mode();
                cop1.write_single(fd, fs.round_with(mode).to_i32() as u32);
            }
            FpuOpcode::CVT_L => {
                let mode = cop1.rounding_mode();
                cop1.write_double(fd, fs.round_with(mode).to_i64() as u64);
            }
            _ => {
                // C.cond.fmt
                let cond = instr.to_bits() & 0xF;
                let unordered = fs.is_nan() || ft.is_nan();
                let result = (unordered && cond & condition::UNORDERED != 0)
                    || (!unordered && fs == ft && cond & condition::EQUAL != 0)
                    || (!unordered && fs < ft && cond & condition::LESS != 0);

                cop1.fcr31 = cop1.fcr31.with_condition(result);
            }
        }

        self.advance();
    }

    /// Conversions from 32 bit integers.
    pub(super) fn exec_word(&mut self, instr: Instruction) {
        let cop1 = &mut self.machine.cop1;
        let value = cop1.read_single(instr.fs_index()) as i32;
        let fd = instr.fd_index();

        match instr.fpu_op() {
            Some(FpuOpcode::CVT_S) => cop1.write_f32(fd, value as f32),
            Some(FpuOpcode::CVT_D) => cop1.write_f64(fd, f64::from(value)),
            _ => {
                self.not_implemented(instr);
                return;
            }
        }

        self.advance();
    }

    /// Conversions from 64 bit integers.
    pub(super) fn exec_long(&mut self, instr: Instruction) {
        let cop1 = &mut self.machine.cop1;
        let value = cop1.read_double(instr.fs_index()) as i64;
        let fd = instr.fd_index();

        match instr.fpu_op() {
            Some(FpuOpcode::CVT_S) => cop1.write_f32(fd, value as f32),
            Some(FpuOpcode::CVT_D) => cop1.write_f64(fd, value as f64),
            _ => {
                self.not_implemented(instr);
                return;
            }
        }

        self.advance();
    }
}
