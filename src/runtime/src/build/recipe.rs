//! Recipe parsing.
//!
//! Reads a build recipe into an ordered list of instructions. Blank lines
//! and `#` comments are skipped. Opcodes are uppercased here but not
//! validated; rejecting unknown opcodes is the build driver's job.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use containy_core::error::{ContainyError, Result};

/// A single recipe instruction. Immutable after parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Uppercased opcode (e.g. "FROM", "RUN")
    pub opcode: String,
    /// Argument string, fields rejoined with single spaces
    pub args: String,
}

impl Instruction {
    /// Canonical text the layer ID is derived from.
    pub fn canonical(&self) -> String {
        format!("{} {}", self.opcode, self.args)
    }
}

/// Parse a recipe file into its instructions, preserving source order.
pub fn parse(path: &Path) -> Result<Vec<Instruction>> {
    let file = File::open(path).map_err(|e| {
        ContainyError::Io(format!("failed to open recipe {}: {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);

    let mut instructions = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| {
            ContainyError::Io(format!("failed to read recipe {}: {}", path.display(), e))
        })?;
        let trimmed = line.trim();

        // Skip comments and empty lines
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        instructions.push(parse_line(trimmed)?);
    }

    Ok(instructions)
}

/// Split a line into an uppercased opcode and its argument string.
fn parse_line(line: &str) -> Result<Instruction> {
    let mut fields = line.split_whitespace();
    let opcode = fields
        .next()
        .ok_or_else(|| ContainyError::Parse(format!("empty instruction line: {line:?}")))?;
    let args = fields.collect::<Vec<_>>().join(" ");

    Ok(Instruction {
        opcode: opcode.to_uppercase(),
        args,
    })
}
