//! Textual LLVM IR assembly.
//!
//! [`Module`] collects finished globals, declarations and definitions in
//! emission order; [`FunctionBuilder`] owns the basic blocks of a single
//! function while it is being lowered. Neither type knows anything about
//! the source language.

use std::fmt::Write as _;

use crate::types::IrType;

/// An IR operand together with the type it currently has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub repr: String,
    pub ty: IrType,
}

impl Value {
    pub fn new(repr: impl Into<String>, ty: IrType) -> Self {
        Value {
            repr: repr.into(),
            ty,
        }
    }

    pub fn int(value: i64) -> Self {
        Value::new(value.to_string(), IrType::Int(64))
    }
}

#[derive(Debug)]
pub struct Module {
    source_filename: String,
    triple: String,
    globals: Vec<String>,
    declarations: Vec<String>,
    definitions: Vec<String>,
}

impl Module {
    pub fn new(source_filename: &str, triple: &str) -> Self {
        Module {
            source_filename: source_filename.to_string(),
            triple: triple.to_string(),
            globals: Vec::new(),
            declarations: Vec::new(),
            definitions: Vec::new(),
        }
    }

    pub fn push_global(&mut self, line: String) {
        self.globals.push(line);
    }

    pub fn push_declaration(&mut self, line: String) {
        self.declarations.push(line);
    }

    pub fn push_definition(&mut self, text: String) {
        self.definitions.push(text);
    }

    pub fn render(&self) -> String {
        let name = escape_name(&self.source_filename);
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{name}'");
        let _ = writeln!(out, "source_filename = \"{name}\"");
        let _ = writeln!(out, "target triple = \"{}\"", self.triple);

        for section in [&self.globals, &self.declarations] {
            if section.is_empty() {
                continue;
            }
            out.push('\n');
            for line in section {
                out.push_str(line);
                out.push('\n');
            }
        }
        for definition in &self.definitions {
            out.push('\n');
            out.push_str(definition);
        }
        out
    }
}

/// Index of a block inside its [`FunctionBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

#[derive(Debug)]
struct Block {
    label: String,
    instructions: Vec<String>,
    terminator: Option<String>,
}

#[derive(Debug)]
pub struct FunctionBuilder {
    header: String,
    /// `alloca`s and their initial stores, printed at the top of the
    /// entry block.
    allocas: Vec<String>,
    prologue: Vec<String>,
    blocks: Vec<Block>,
    current: usize,
    temps: u32,
    ids: u32,
}

impl FunctionBuilder {
    pub const ENTRY: &'static str = "fn.entry";

    /// `header` is everything before the opening brace, e.g.
    /// `define i64 @main()`.
    pub fn new(header: String) -> Self {
        FunctionBuilder {
            header,
            allocas: Vec::new(),
            prologue: Vec::new(),
            blocks: vec![Block {
                label: Self::ENTRY.to_string(),
                instructions: Vec::new(),
                terminator: None,
            }],
            current: 0,
            temps: 0,
            ids: 0,
        }
    }

    /// Returns a fresh number for naming a group of related blocks.
    pub fn next_id(&mut self) -> u32 {
        let id = self.ids;
        self.ids += 1;
        id
    }

    pub fn append_block(&mut self, label: String) -> BlockId {
        self.blocks.push(Block {
            label,
            instructions: Vec::new(),
            terminator: None,
        });
        BlockId(self.blocks.len() - 1)
    }

    pub fn position_at(&mut self, block: BlockId) {
        self.current = block.0;
    }

    pub fn current_label(&self) -> &str {
        &self.blocks[self.current].label
    }

    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current].terminator.is_some()
    }

    /// Reserves a stack slot in the entry block.
    pub fn alloca(&mut self, slot: &str, ty: &IrType) {
        self.allocas.push(format!("{slot} = alloca {ty}"));
    }

    /// Emits an instruction that runs once when the function is entered,
    /// after every `alloca`.
    pub fn prologue(&mut self, instruction: String) {
        self.prologue.push(instruction);
    }

    pub fn emit(&mut self, instruction: String) {
        self.blocks[self.current].instructions.push(instruction);
    }

    /// Emits `rhs` into a fresh temporary and returns its name.
    pub fn assign(&mut self, rhs: String) -> String {
        let name = format!("%.t{}", self.temps);
        self.temps += 1;
        self.emit(format!("{name} = {rhs}"));
        name
    }

    /// Sets the terminator of the current block unless it already has one.
    pub fn terminate(&mut self, terminator: String) {
        let block = &mut self.blocks[self.current];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    pub fn branch(&mut self, label: &str) {
        self.terminate(format!("br label %{label}"));
    }

    pub fn cond_branch(&mut self, cond: &str, then_label: &str, else_label: &str) {
        self.terminate(format!(
            "br i1 {cond}, label %{then_label}, label %{else_label}"
        ));
    }

    pub fn finish(self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {{", self.header);
        for (index, block) in self.blocks.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "{}:", block.label);
            let preamble: Vec<&String> = if index == 0 {
                self.allocas.iter().chain(self.prologue.iter()).collect()
            } else {
                Vec::new()
            };
            for line in preamble.into_iter().chain(block.instructions.iter()) {
                let _ = writeln!(out, "  {line}");
            }
            let terminator = block.terminator.as_deref().unwrap_or("unreachable");
            let _ = writeln!(out, "  {terminator}");
        }
        out.push_str("}\n");
        out
    }
}

/// Encodes bytes as the body of an IR `c"..."` constant.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if (0x20..=0x7e).contains(&byte) && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\{byte:02X}");
        }
    }
    out
}

fn escape_name(name: &str) -> String {
    escape_bytes(name.as_bytes())
}
