//! Table compression: default reductions and first-fit row packing.
//!
//! Both dense tables are packed into flat `i16` vectors.  Every action
//! row first elects a default action; cells equal to the default (and
//! error cells, which decode to the default anyway) are left out, and the
//! surviving sparse rows are packed by assigning each one the smallest
//! base that keeps its occupied slots disjoint from everything placed
//! before it.  Action slots carry an owner-state tag next to the code so
//! a lookup can tell a genuine entry from another row's; goto slots are
//! bare, which is harmless because the driver only consults gotos that
//! exist.

use crate::{
    grammar::{Grammar, ProductionID, TerminalID},
    parse_table::{ActionCode, ActionTable, ReduceTable},
};

#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("compressed table exceeds the 16-bit index range")]
    TableOverflow,
}

/// Vacant owner tags and goto slots; never a valid state index.
const VACANT: i16 = -1;

fn narrow(value: usize) -> Result<i16, CompressError> {
    i16::try_from(value).map_err(|_| CompressError::TableOverflow)
}

fn narrow_code(code: ActionCode) -> Result<i16, CompressError> {
    i16::try_from(code.raw()).map_err(|_| CompressError::TableOverflow)
}

/// Elect the default action of one row: a reduce sitting on the `error`
/// column pins the default; otherwise the production with the most reduce
/// cells wins; a row without reduces defaults to the error action.
fn default_action(row: &[ActionCode]) -> ActionCode {
    let error_column = TerminalID::ERROR.into_raw() as usize;
    if row[error_column].is_reduce() {
        return row[error_column];
    }

    let mut counts: Vec<(ActionCode, u32)> = Vec::new();
    let mut best: Option<usize> = None;
    for code in row {
        if !code.is_reduce() {
            continue;
        }
        let slot = match counts.iter().position(|(c, _)| c == code) {
            Some(slot) => {
                counts[slot].1 += 1;
                slot
            }
            None => {
                counts.push((*code, 1));
                counts.len() - 1
            }
        };
        if best.map_or(true, |b| counts[slot].1 > counts[b].1) {
            best = Some(slot);
        }
    }
    best.map_or(ActionCode::ERROR, |b| counts[b].0)
}

/// Pack the action table.  Returns the per-state base vector and the flat
/// table: `packed[0..S)` are the per-state defaults, followed by
/// owner-tag/action pairs.  `base[s] = S + 2·b` points a lookup for
/// `(s, t)` at `packed[base[s] + 2t]`.
pub(crate) fn compress_actions(
    table: &ActionTable,
    compact_reduces: bool,
) -> Result<(Vec<i16>, Vec<i16>), CompressError> {
    let num_states = table.num_states();

    let mut defaults = Vec::with_capacity(num_states);
    let mut sparse: Vec<Vec<(usize, ActionCode)>> = Vec::with_capacity(num_states);
    for state in 0..num_states {
        let row = table.row(state);
        let default = if compact_reduces {
            default_action(row)
        } else {
            ActionCode::ERROR
        };
        defaults.push(default);
        sparse.push(
            row.iter()
                .enumerate()
                .filter(|(_, code)| **code != ActionCode::ERROR && **code != default)
                .map(|(column, code)| (column, *code))
                .collect(),
        );
    }

    let mut used = bit_set::BitSet::new();
    let mut base_table = vec![0i16; num_states];
    let mut slots: Vec<(i16, i16)> = Vec::new();

    for (state, columns) in sparse.iter().enumerate() {
        let base = first_fit(&used, columns);
        base_table[state] = narrow(num_states + 2 * base)?;
        for &(column, code) in columns {
            let slot = base + column;
            narrow(num_states + 2 * slot + 1)?;
            used.insert(slot);
            if slots.len() <= slot {
                slots.resize(slot + 1, (VACANT, 0));
            }
            slots[slot] = (narrow(state)?, narrow_code(code)?);
        }
    }

    let mut packed = Vec::with_capacity(num_states + 2 * slots.len());
    for default in defaults {
        packed.push(narrow_code(default)?);
    }
    for (owner, code) in slots {
        packed.push(owner);
        packed.push(code);
    }

    tracing::debug!(
        num_states,
        packed_len = packed.len(),
        "action table compressed"
    );
    Ok((base_table, packed))
}

/// Pack the goto table.  `packed[0..S)` are the per-state bases (stored
/// as `S + b`), followed by the slot area; `packed[base[s] + n]` holds
/// the target state for nonterminal `n`, `-1` where vacant.
pub(crate) fn compress_reduces(table: &ReduceTable) -> Result<Vec<i16>, CompressError> {
    let num_states = table.num_states();

    let mut sparse: Vec<Vec<(usize, i16)>> = Vec::with_capacity(num_states);
    for state in 0..num_states {
        let mut columns = Vec::new();
        for nonterminal in 0..table.num_nonterminals() {
            if let Some(target) = table.get(state, nonterminal) {
                columns.push((nonterminal, narrow(target.into_raw() as usize)?));
            }
        }
        sparse.push(columns);
    }

    let mut used = bit_set::BitSet::new();
    let mut bases = vec![0i16; num_states];
    let mut slots: Vec<i16> = Vec::new();

    for (state, columns) in sparse.iter().enumerate() {
        let base = first_fit(&used, columns);
        bases[state] = narrow(num_states + base)?;
        for &(column, target) in columns {
            let slot = base + column;
            narrow(num_states + slot)?;
            used.insert(slot);
            if slots.len() <= slot {
                slots.resize(slot + 1, VACANT);
            }
            slots[slot] = target;
        }
    }

    let mut packed = Vec::with_capacity(num_states + slots.len());
    packed.extend_from_slice(&bases);
    packed.extend_from_slice(&slots);

    tracing::debug!(
        num_states,
        packed_len = packed.len(),
        "goto table compressed"
    );
    Ok(packed)
}

/// Smallest base that leaves every occupied column of the row on a free
/// slot of the global bitmap.
fn first_fit<T>(used: &bit_set::BitSet, columns: &[(usize, T)]) -> usize {
    let mut base = 0;
    'search: loop {
        for (column, _) in columns {
            if used.contains(base + column) {
                base += 1;
                continue 'search;
            }
        }
        return base;
    }
}

/// Decode one action from the packed representation.
pub fn lookup_action(base: &[i16], packed: &[i16], state: usize, terminal: usize) -> i16 {
    let slot = base[state] as usize + 2 * terminal;
    if slot + 1 < packed.len() && packed[slot] == state as i16 {
        packed[slot + 1]
    } else {
        packed[state]
    }
}

/// Decode one goto target from the packed representation.
pub fn lookup_goto(packed: &[i16], state: usize, nonterminal: usize) -> Option<i16> {
    let slot = packed[state] as usize + nonterminal;
    match packed.get(slot) {
        Some(&target) if target != VACANT => Some(target),
        _ => None,
    }
}

// ==== output bundle ====

/// One row of the production table handed to the runtime driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProductionEntry {
    pub lhs: u16,
    /// Number of symbols on the rewritten right-hand side.
    pub rhs_length: u16,
    /// Number of semantic values popped when reducing; differs from
    /// `rhs_length` for embedded-action productions.
    pub stack_depth: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub num_states: usize,
    pub num_productions: usize,
    pub num_conflicts: u32,
    pub expected_conflicts: u32,
    pub unused_terminals: u32,
    pub unused_nonterminals: u32,
    pub never_reduced: u32,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------- parser generation summary -------")?;
        writeln!(
            f,
            "  {} productions, {} parse states",
            self.num_productions, self.num_states
        )?;
        writeln!(
            f,
            "  {} terminals and {} nonterminals declared but not used",
            self.unused_terminals, self.unused_nonterminals
        )?;
        writeln!(f, "  {} productions never reduced", self.never_reduced)?;
        writeln!(
            f,
            "  {} conflicts detected ({} expected)",
            self.num_conflicts, self.expected_conflicts
        )
    }
}

/// The compact table bundle consumed by the emission collaborator and the
/// runtime driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBundle {
    pub action_base: Vec<i16>,
    pub action_table: Vec<i16>,
    pub reduce_table: Vec<i16>,
    pub production_table: Vec<ProductionEntry>,
    /// Reduce-action payload of each production, by production index.
    pub action_code_table: Vec<Option<String>>,
    pub summary: Summary,
}

pub(crate) fn production_tables(g: &Grammar) -> (Vec<ProductionEntry>, Vec<Option<String>>) {
    let mut entries = Vec::with_capacity(g.num_productions());
    let mut payloads = Vec::with_capacity(g.num_productions());
    for index in 0..g.num_productions() {
        let production = g.production(ProductionID::from_raw(index as u16));
        entries.push(ProductionEntry {
            lhs: production.lhs.into_raw(),
            rhs_length: production.rhs_length() as u16,
            stack_depth: production.stack_depth() as u16,
        });
        payloads.push(production.action.clone());
    }
    (entries, payloads)
}
