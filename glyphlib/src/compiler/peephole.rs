//! Instruction-level rewrites. Every pass keeps jump targets valid by
//! remapping them through an old-index to new-index table.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::bytecode::{BytecodeModule, Instr};
use crate::value::Value;

/// Collapses straight-line constant loads:
/// - `PUSH..; BUILD_ARRAY n` and `PUSH..; BUILD_OBJECT n` become one `PUSH`
///   of a pre-built template constant
/// - `PUSH; POP` disappears
///
/// A run is only merged when no jump lands inside it.
pub(super) fn merge_constant_loads(module: &mut BytecodeModule) {
    let code = std::mem::take(&mut module.code);
    let constants = &mut module.constants;
    let targets: HashSet<usize> = code
        .iter()
        .filter_map(|i| i.jump_target().map(|t| t as usize))
        .collect();

    // (instruction, index of the first original instruction it stands for)
    let mut out: Vec<(Instr, usize)> = Vec::with_capacity(code.len());
    for (at, instr) in code.iter().enumerate() {
        let merged = match *instr {
            Instr::BuildArray(n) => fold_array(&out, n as usize, at, &targets, constants)
                .map(|value| (value, n as usize)),
            Instr::BuildObject(n) => {
                let width = 2 * n as usize;
                fold_object(&out, width, at, &targets, constants).map(|value| (value, width))
            }
            Instr::Pop => {
                if push_run(&out, 1, at, &targets).is_some() {
                    out.pop();
                    continue;
                }
                None
            }
            _ => None,
        };
        match merged {
            Some((value, width)) => {
                let first = out[out.len() - width..]
                    .first()
                    .map_or(at, |(_, origin)| *origin);
                out.truncate(out.len() - width);
                constants.push(value);
                out.push((Instr::Push((constants.len() - 1) as u32), first));
            }
            None => out.push((*instr, at)),
        }
    }

    let map = index_map(code.len(), &out);
    module.code = out
        .into_iter()
        .map(|(instr, _)| match instr.jump_target() {
            Some(t) => instr.with_target(map[t as usize] as u32),
            None => instr,
        })
        .collect();
}

/// Points jumps whose destination is an unconditional jump at the final
/// destination of the chain. Cycles are left as they are.
pub(super) fn thread_jumps(code: &mut [Instr]) {
    for at in 0..code.len() {
        let Some(mut target) = code[at].jump_target() else {
            continue;
        };
        let mut hops = 0;
        while let Some(Instr::Jump(next)) = code.get(target as usize) {
            if *next == target || hops > code.len() {
                break;
            }
            target = *next;
            hops += 1;
        }
        if hops > code.len() {
            continue;
        }
        code[at] = code[at].with_target(target);
    }
}

/// The run of `width` pushes ending just before `at`, if it is mergeable.
fn push_run<'a>(
    out: &'a [(Instr, usize)],
    width: usize,
    at: usize,
    targets: &HashSet<usize>,
) -> Option<&'a [(Instr, usize)]> {
    if out.len() < width {
        return None;
    }
    let run = &out[out.len() - width..];
    if !run.iter().all(|(i, _)| matches!(i, Instr::Push(_))) {
        return None;
    }
    let first = run.first().map_or(at, |(_, origin)| *origin);
    if targets.iter().any(|t| *t > first && *t <= at) {
        return None;
    }
    Some(run)
}

fn pushed_value<'a>(instr: &Instr, constants: &'a [Value]) -> Option<&'a Value> {
    match instr {
        Instr::Push(idx) => constants.get(*idx as usize),
        _ => None,
    }
}

fn fold_array(
    out: &[(Instr, usize)],
    n: usize,
    at: usize,
    targets: &HashSet<usize>,
    constants: &[Value],
) -> Option<Value> {
    let run = push_run(out, n, at, targets)?;
    run.iter()
        .map(|(i, _)| pushed_value(i, constants).cloned())
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}

fn fold_object(
    out: &[(Instr, usize)],
    width: usize,
    at: usize,
    targets: &HashSet<usize>,
    constants: &[Value],
) -> Option<Value> {
    let run = push_run(out, width, at, targets)?;
    let mut fields = IndexMap::with_capacity(width / 2);
    for pair in run.chunks(2) {
        let key = pushed_value(&pair[0].0, constants)?.as_str()?;
        let value = pushed_value(&pair[1].0, constants)?;
        fields.insert(key.to_string(), value.clone());
    }
    Some(Value::Object(fields))
}

/// Maps each original index to the new index that execution reaches there.
/// Removed instructions map to the next surviving one.
fn index_map(old_len: usize, out: &[(Instr, usize)]) -> Vec<usize> {
    let mut map = vec![usize::MAX; old_len + 1];
    map[old_len] = out.len();
    for (new, (_, origin)) in out.iter().enumerate() {
        map[*origin] = new;
    }
    for old in (0..old_len).rev() {
        if map[old] == usize::MAX {
            map[old] = map[old + 1];
        }
    }
    map
}
