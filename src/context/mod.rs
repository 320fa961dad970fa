//! Context module - prompt assembly from triggers and retrieved procedures

pub mod assembler;

pub use assembler::{
    assemble, assemble_disclaimer, Prompt, GENERIC_DISCLAIMER, PROCEDURE_DELIMITER,
    SYSTEM_PREAMBLE,
};
