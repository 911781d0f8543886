//! An LALR(1) parser-table generator.
//!
//! The pipeline is strictly batched: a [`Grammar`] is defined (rewriting
//! embedded actions and fixing nullability and FIRST sets on the way),
//! the viable-prefix machine is built with lookahead propagation, the
//! dense action/goto tables are filled with precedence-based conflict
//! resolution, and the result is packed into the flat integer vectors of
//! a [`TableBundle`].  Everything the generator has to say on the way is
//! collected in a [`Diagnostics`] value.

pub mod compress;
pub mod diagnostics;
pub mod grammar;
pub mod lalr;
pub mod parse_table;

mod first_sets;
mod types;

pub use crate::{
    compress::{lookup_action, lookup_goto, Summary, TableBundle},
    diagnostics::Diagnostics,
    grammar::Grammar,
};

use crate::{
    diagnostics::ErrorKind,
    grammar::{NonterminalID, TerminalID},
};

/// Options honored by [`generate`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Replace the error entries of every action row by its most frequent
    /// reduce, shrinking the packed table.
    pub compact_reduces: bool,
    /// How many reported conflicts the grammar is allowed to have before
    /// table emission is aborted.
    pub expected_conflicts: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compact_reduces: false,
            expected_conflicts: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    TableOverflow(#[from] compress::CompressError),

    #[error("{found} conflicts detected where {expected} were expected")]
    UnexpectedConflicts { found: u32, expected: u32 },
}

/// Run the full analysis and emit the compact table bundle.
///
/// Conflicts and specification problems accumulate in `diag` without
/// aborting; only a conflict count above `options.expected_conflicts` or
/// a compression overflow makes the build fail.
pub fn generate(
    grammar: &Grammar,
    options: &Options,
    diag: &mut Diagnostics,
) -> Result<TableBundle, GenerateError> {
    let (unused_terminals, unused_nonterminals) = check_unused(grammar, diag);

    tracing::debug!("building the viable-prefix machine");
    let machine = lalr::Machine::build(grammar);

    tracing::debug!("filling parse tables");
    let tables = parse_table::fill(grammar, &machine, diag);
    let never_reduced = parse_table::check_reductions(grammar, &tables.actions, diag);

    if tables.num_conflicts > options.expected_conflicts {
        diag.fatal(
            ErrorKind::UnexpectedConflictCount,
            format!(
                "{} conflicts detected where {} were expected -- table emission aborted",
                tables.num_conflicts, options.expected_conflicts
            ),
        );
        return Err(GenerateError::UnexpectedConflicts {
            found: tables.num_conflicts,
            expected: options.expected_conflicts,
        });
    }

    tracing::debug!("compressing parse tables");
    let (action_base, action_table) =
        compress::compress_actions(&tables.actions, options.compact_reduces)
            .map_err(|err| overflow(diag, err))?;
    let reduce_table =
        compress::compress_reduces(&tables.reduces).map_err(|err| overflow(diag, err))?;

    let (production_table, action_code_table) = compress::production_tables(grammar);

    Ok(TableBundle {
        action_base,
        action_table,
        reduce_table,
        production_table,
        action_code_table,
        summary: Summary {
            num_states: machine.num_states(),
            num_productions: grammar.num_productions(),
            num_conflicts: tables.num_conflicts,
            expected_conflicts: options.expected_conflicts,
            unused_terminals,
            unused_nonterminals,
            never_reduced,
        },
    })
}

fn overflow(diag: &mut Diagnostics, err: compress::CompressError) -> GenerateError {
    diag.fatal(ErrorKind::TableOverflow, err.to_string());
    GenerateError::TableOverflow(err)
}

/// Warn about declared-but-unused terminals and nonterminals and about
/// nonterminals without a production.
fn check_unused(grammar: &Grammar, diag: &mut Diagnostics) -> (u32, u32) {
    let mut unused_terminals = 0;
    for (id, terminal) in &grammar.terminals {
        if *id == TerminalID::EOF || *id == TerminalID::ERROR {
            continue;
        }
        if !terminal.is_used() {
            unused_terminals += 1;
            diag.warning(
                ErrorKind::UnusedSymbol,
                format!("terminal \"{}\" was declared but never used", terminal.name),
            );
        }
    }

    let mut unused_nonterminals = 0;
    for (id, nonterminal) in &grammar.nonterminals {
        if *id == NonterminalID::START {
            continue;
        }
        if !nonterminal.is_used() {
            unused_nonterminals += 1;
            diag.warning(
                ErrorKind::UnusedSymbol,
                format!(
                    "nonterminal \"{}\" was declared but never used",
                    nonterminal.name
                ),
            );
        } else if nonterminal.productions().is_empty() {
            unused_nonterminals += 1;
            diag.warning(
                ErrorKind::UnusedSymbol,
                format!("nonterminal \"{}\" has no production", nonterminal.name),
            );
        }
    }

    (unused_terminals, unused_nonterminals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_symbols_are_warned_and_counted() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let x = g.terminal("X", None, None);
            let _idle = g.terminal("IDLE", None, None);
            let s = g.nonterminal("S", None);
            let _orphan = g.nonterminal("ORPHAN", None);
            g.start_symbol(s);
            g.production(s, [x.into()], None);
        });
        let bundle = generate(&grammar, &Options::default(), &mut diag).unwrap();

        assert_eq!(bundle.summary.unused_terminals, 1);
        assert_eq!(bundle.summary.unused_nonterminals, 1);
        let unused: Vec<_> = diag
            .emitted()
            .iter()
            .filter(|d| d.kind == ErrorKind::UnusedSymbol)
            .collect();
        assert_eq!(unused.len(), 2);
        assert!(unused[0].message.contains("IDLE"));
        assert!(unused[1].message.contains("ORPHAN"));
        assert_eq!(diag.exit_status(), 0);
    }

    #[test]
    fn conflict_count_gate_aborts_emission() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, None);
            let id = g.terminal("ID", None, None);
            let e = g.nonterminal("E", None);
            g.production(e, [e.into(), plus.into(), e.into()], None);
            g.production(e, [id.into()], None);
        });

        match generate(&grammar, &Options::default(), &mut diag) {
            Err(GenerateError::UnexpectedConflicts { found: 1, expected: 0 }) => {}
            other => panic!("expected the conflict gate to fire, got {:?}", other),
        }
        assert_eq!(diag.exit_status(), 1);

        // the same grammar passes once the conflict is expected
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, None);
            let id = g.terminal("ID", None, None);
            let e = g.nonterminal("E", None);
            g.production(e, [e.into(), plus.into(), e.into()], None);
            g.production(e, [id.into()], None);
        });
        let options = Options {
            expected_conflicts: 1,
            ..Options::default()
        };
        let bundle = generate(&grammar, &options, &mut diag).unwrap();
        assert_eq!(bundle.summary.num_conflicts, 1);
        assert_eq!(diag.exit_status(), 0);
    }
}
