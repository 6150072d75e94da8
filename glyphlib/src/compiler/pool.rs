use std::collections::HashMap;

use crate::bytecode::BytecodeModule;
use crate::value::Value;

/// Constant pool under construction. Literals get one entry per occurrence;
/// local names are interned.
#[derive(Default)]
pub(super) struct ConstantPool {
    values: Vec<Value>,
    names: HashMap<String, u32>,
}

impl ConstantPool {
    pub(super) fn push_literal(&mut self, value: Value) -> u32 {
        let idx = self.values.len() as u32;
        self.values.push(value);
        idx
    }

    pub(super) fn intern_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.names.get(name) {
            return *idx;
        }
        let idx = self.push_literal(Value::String(name.to_string()));
        self.names.insert(name.to_string(), idx);
        idx
    }

    pub(super) fn mark(&self) -> usize {
        self.values.len()
    }

    /// Forgets every entry added since `mark`.
    pub(super) fn rollback(&mut self, mark: usize) {
        self.values.truncate(mark);
        self.names.retain(|_, idx| (*idx as usize) < mark);
    }

    pub(super) fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Merges identical entries and drops unreferenced ones.
///
/// Survivors keep their original relative order and each group of duplicates
/// collapses onto its first occurrence, so output is reproducible.
pub(super) fn deduplicate(module: &mut BytecodeModule) {
    let mut referenced = vec![false; module.constants.len()];
    for instr in &module.code {
        if let Some(idx) = instr.pool_index() {
            if let Some(slot) = referenced.get_mut(idx as usize) {
                *slot = true;
            }
        }
    }

    let mut kept: Vec<Value> = Vec::new();
    let mut remap: Vec<Option<u32>> = vec![None; module.constants.len()];
    for (old, value) in module.constants.iter().enumerate() {
        if !referenced[old] {
            continue;
        }
        let existing = kept.iter().position(|k| k.same_constant(value));
        let new = match existing {
            Some(pos) => pos as u32,
            None => {
                kept.push(value.clone());
                (kept.len() - 1) as u32
            }
        };
        remap[old] = Some(new);
    }

    for instr in &mut module.code {
        if let Some(old) = instr.pool_index() {
            if let Some(Some(new)) = remap.get(old as usize) {
                *instr = instr.with_pool_index(*new);
            }
        }
    }
    module.constants = kept;
}
