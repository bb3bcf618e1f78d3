//! Dispatcher detection and carrier extraction.

use crate::{
    ir::{Function, Storage},
    log::*,
};

/// Selects the dispatcher block: the non-sentinel block with the most
/// predecessors, ties broken by lowest serial.
///
/// Every flattened block jumps back to the dispatcher, so its in-degree
/// dwarfs everything else. A preprocessing block inserted ahead of the
/// dispatcher can fool the heuristic; callers with better knowledge pass an
/// explicit serial instead of calling this.
#[must_use]
pub fn detect(func: &Function) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for serial in func.inner_serials() {
        let npred = func.block(serial).npred();
        if best.is_none_or(|(_, n)| npred > n) {
            best = Some((serial, npred));
        }
    }
    let serial = best.map(|(serial, _)| serial);
    if let Some(serial) = serial {
        debug!("dispatcher detected"; "block" => serial, "preds" => func.block(serial).npred());
    }
    serial
}

/// Extracts the dispatch carrier from a dispatcher block.
///
/// The dispatcher's terminal instruction must be a handled comparison jump
/// whose left operand is a register or stack slot; that storage is the
/// carrier. Anything else means the block is not a dispatcher (or the
/// flattening shape is one this engine does not handle), and deflattening is
/// skipped.
#[must_use]
pub fn extract_carrier(func: &Function, serial: usize) -> Option<Storage> {
    let tail = func.block(serial).tail()?;
    if !tail.opcode.is_handled_jump() {
        debug!("block is not a dispatcher"; "block" => serial, "tail" => %tail);
        return None;
    }
    let storage = tail.left.storage()?;
    debug!("dispatch carrier found"; "block" => serial, "carrier" => %storage);
    Some(storage)
}

/// Majority vote over every handled comparison jump in the function: returns
/// the storage location most frequently used as the compared operand.
///
/// Ties go to the location seen first in block order. Used by the
/// busiest-carrier strategy when the single dispatcher's own carrier is not
/// trusted.
#[must_use]
pub fn busiest_carrier(func: &Function) -> Option<Storage> {
    let mut votes: Vec<(Storage, usize)> = Vec::new();
    for block in func.blocks() {
        for insn in &block.insns {
            if !insn.opcode.is_handled_jump() {
                continue;
            }
            let Some(storage) = insn.left.storage() else {
                continue;
            };
            match votes.iter_mut().find(|(s, _)| *s == storage) {
                Some((_, count)) => *count += 1,
                None => votes.push((storage, 1)),
            }
        }
    }
    // max_by_key picks the last maximum; first-seen wins here.
    let (carrier, count) = votes.into_iter().reduce(|best, cand| {
        if cand.1 > best.1 {
            cand
        } else {
            best
        }
    })?;
    debug!("busiest carrier voted"; "carrier" => %carrier, "votes" => count);
    Some(carrier)
}
