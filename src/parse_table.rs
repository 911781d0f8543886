//! Dense parse tables: action filling and conflict resolution.
//!
//! Every cell of the action table carries an integer-encoded action:
//! 0 is the error entry, odd codes are shifts, positive even codes are
//! reduces.  The same encoding flows unchanged into the compressed
//! representation consumed by the runtime driver.

use crate::{
    diagnostics::{Diagnostics, ErrorKind},
    grammar::{Assoc, Grammar, Precedence, ProductionID, SymbolID, TerminalID, TerminalSet},
    lalr::{Machine, State, StateID},
};
use std::fmt;

/// Integer-encoded parse action.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ActionCode(i32);

impl ActionCode {
    pub const ERROR: Self = Self(0);

    pub fn shift(to: StateID) -> Self {
        Self(2 * to.into_raw() as i32 + 1)
    }

    pub fn reduce(production: ProductionID) -> Self {
        Self(2 * production.into_raw() as i32 + 2)
    }

    pub fn is_shift(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_reduce(self) -> bool {
        self.0 != 0 && self.0 & 1 == 0
    }

    /// Target state of a shift, or production of a reduce.
    pub fn index(self) -> usize {
        ((self.0 - 1) >> 1) as usize
    }

    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_shift() {
            write!(f, "shift({})", self.index())
        } else if self.is_reduce() {
            write!(f, "reduce({})", self.index())
        } else {
            f.write_str("error")
        }
    }
}

/// Dense `states × terminals` action matrix.
#[derive(Debug)]
pub struct ActionTable {
    pub(crate) rows: Vec<Vec<ActionCode>>,
    pub(crate) num_terminals: usize,
}

impl ActionTable {
    fn new(num_states: usize, num_terminals: usize) -> Self {
        Self {
            rows: vec![vec![ActionCode::ERROR; num_terminals]; num_states],
            num_terminals,
        }
    }

    pub fn num_states(&self) -> usize {
        self.rows.len()
    }

    pub fn num_terminals(&self) -> usize {
        self.num_terminals
    }

    pub fn get(&self, state: usize, terminal: usize) -> ActionCode {
        self.rows[state][terminal]
    }

    pub fn row(&self, state: usize) -> &[ActionCode] {
        &self.rows[state]
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        ActionTableDisplay {
            grammar: g,
            table: self,
        }
    }
}

struct ActionTableDisplay<'g> {
    grammar: &'g Grammar,
    table: &'g ActionTable,
}

impl fmt::Display for ActionTableDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (state, row) in self.table.rows.iter().enumerate() {
            writeln!(f, "state {}:", state)?;
            for (column, code) in row.iter().enumerate() {
                if *code != ActionCode::ERROR {
                    let terminal = TerminalID::from_raw(column as u16);
                    let name = &self.grammar.terminal(terminal).name;
                    writeln!(f, "  {} => {:?}", name, code)?;
                }
            }
        }
        Ok(())
    }
}

/// Dense `states × nonterminals` goto matrix.
#[derive(Debug)]
pub struct ReduceTable {
    pub(crate) rows: Vec<Vec<Option<StateID>>>,
    pub(crate) num_nonterminals: usize,
}

impl ReduceTable {
    fn new(num_states: usize, num_nonterminals: usize) -> Self {
        Self {
            rows: vec![vec![None; num_nonterminals]; num_states],
            num_nonterminals,
        }
    }

    pub fn num_states(&self) -> usize {
        self.rows.len()
    }

    pub fn num_nonterminals(&self) -> usize {
        self.num_nonterminals
    }

    pub fn get(&self, state: usize, nonterminal: usize) -> Option<StateID> {
        self.rows[state][nonterminal]
    }
}

/// Outcome of filling both tables.
#[derive(Debug)]
pub struct Tables {
    pub actions: ActionTable,
    pub reduces: ReduceTable,
    pub num_conflicts: u32,
}

/// Fill the action and goto tables from the machine, resolving conflicts
/// by precedence and reporting the rest.  Reduce entries are placed
/// first, in item order; shift entries and gotos follow in transition
/// order, so reduce/reduce collisions are settled (lowest production
/// index wins) before any shift is considered.
pub fn fill(g: &Grammar, machine: &Machine, diag: &mut Diagnostics) -> Tables {
    let mut actions = ActionTable::new(machine.num_states(), g.num_terminals());
    let mut reduces = ReduceTable::new(machine.num_states(), g.num_nonterminals());
    let mut num_conflicts = 0;

    for (state_id, state) in machine.states() {
        let row = &mut actions.rows[state_id.into_raw() as usize];
        let mut unresolved_shift_reduce = TerminalSet::default();
        let mut saw_reduce_reduce = false;

        for (item, cell) in state.items() {
            if !item.dot_at_end(g) {
                continue;
            }
            let code = ActionCode::reduce(item.production);
            for t in machine.lookahead(cell).iter() {
                let column = t.into_raw() as usize;
                let current = row[column];
                if current == ActionCode::ERROR {
                    row[column] = code;
                } else {
                    // only reduces have been placed so far
                    saw_reduce_reduce = true;
                    if (item.production.into_raw() as usize) < current.index() {
                        row[column] = code;
                    }
                }
            }
        }

        for &(symbol, next) in state.transitions() {
            match symbol {
                SymbolID::T(t) => {
                    let column = t.into_raw() as usize;
                    let code = ActionCode::shift(next);
                    let current = row[column];
                    if current == ActionCode::ERROR {
                        row[column] = code;
                        continue;
                    }
                    let production = ProductionID::from_raw(current.index() as u16);
                    match resolve_by_precedence(
                        g.production(production).precedence,
                        g.terminal(t).precedence,
                    ) {
                        Some(Resolution::Shift) => row[column] = code,
                        Some(Resolution::Reduce) => {}
                        Some(Resolution::Error) => {
                            row[column] = ActionCode::ERROR;
                            diag.warning(
                                ErrorKind::NonassocConflict,
                                format!(
                                    "nonassociative conflict in state {:?}\n  \
                                     on symbol {}: {}\n  \
                                     both actions replaced by an error entry",
                                    state_id,
                                    g.terminal(t).name,
                                    g.production(production).display(g),
                                ),
                            );
                        }
                        None => {
                            // no usable precedence pair: shift wins
                            row[column] = code;
                            unresolved_shift_reduce.insert(t);
                        }
                    }
                }
                SymbolID::N(n) => {
                    reduces.rows[state_id.into_raw() as usize][n.into_raw() as usize] = Some(next);
                }
            }
        }

        if saw_reduce_reduce || !unresolved_shift_reduce.is_empty() {
            num_conflicts += report_conflicts(
                g,
                machine,
                state_id,
                state,
                &unresolved_shift_reduce,
                saw_reduce_reduce,
                diag,
            );
        }
    }

    tracing::debug!(num_conflicts, "parse tables filled");

    Tables {
        actions,
        reduces,
        num_conflicts,
    }
}

#[derive(Copy, Clone)]
enum Resolution {
    Shift,
    Reduce,
    Error,
}

/// Defined only when both sides carry a precedence.  Higher priority
/// wins; on a tie the terminal's associativity decides, with
/// nonassociativity turning the entry into an error.
fn resolve_by_precedence(
    production: Option<Precedence>,
    terminal: Option<Precedence>,
) -> Option<Resolution> {
    let (p, t) = (production?, terminal?);
    Some(if p.priority > t.priority {
        Resolution::Reduce
    } else if p.priority < t.priority {
        Resolution::Shift
    } else {
        match t.assoc {
            Assoc::Left => Resolution::Reduce,
            Assoc::Right => Resolution::Shift,
            Assoc::Nonassoc => Resolution::Error,
        }
    })
}

/// Produce the warning messages for the conflicts found in one state and
/// return how many were reported.
fn report_conflicts(
    g: &Grammar,
    machine: &Machine,
    state_id: StateID,
    state: &State,
    shift_reduce_terms: &TerminalSet,
    saw_reduce_reduce: bool,
    diag: &mut Diagnostics,
) -> u32 {
    let mut reported = 0;
    let completed: Vec<_> = state.items().filter(|(item, _)| item.dot_at_end(g)).collect();

    if saw_reduce_reduce {
        for (i, &(item1, cell1)) in completed.iter().enumerate() {
            for &(item2, cell2) in &completed[i + 1..] {
                if !machine.lookahead(cell1).intersects(machine.lookahead(cell2)) {
                    continue;
                }
                let (first, second) = if item1.production <= item2.production {
                    (item1, item2)
                } else {
                    (item2, item1)
                };
                let mut both = machine.lookahead(cell1).clone();
                both.intersect_with(machine.lookahead(cell2));
                diag.warning(
                    ErrorKind::ReduceReduceConflict,
                    format!(
                        "reduce/reduce conflict in state {:?}\n  \
                         between {}\n  and     {}\n  \
                         under symbols {}\n  \
                         resolved in favor of the earlier production",
                        state_id,
                        first.display(g),
                        second.display(g),
                        display_terminals(g, &both),
                    ),
                );
                reported += 1;
            }
        }
    }

    for &(item, cell) in &completed {
        for t in machine.lookahead(cell).iter() {
            if !shift_reduce_terms.contains(t) {
                continue;
            }
            let mut message = format!(
                "shift/reduce conflict in state {:?}\n  between {}",
                state_id,
                item.display(g),
            );
            for (other, _) in state.items() {
                if other.symbol_after_dot(g) == Some(SymbolID::T(t)) {
                    message.push_str(&format!("\n  and     {}", other.display(g)));
                }
            }
            message.push_str(&format!(
                "\n  under symbol {}\n  resolved in favor of shifting",
                g.terminal(t).name
            ));
            diag.warning(ErrorKind::ShiftReduceConflict, message);
            reported += 1;
        }
    }

    reported
}

fn display_terminals<'g>(g: &'g Grammar, set: &TerminalSet) -> String {
    let mut out = String::from("{");
    for (i, t) in set.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&g.terminal(t).name);
    }
    out.push('}');
    out
}

/// Count how often every production is reduced somewhere in the table and
/// warn once about each production that never is.
pub fn check_reductions(g: &Grammar, actions: &ActionTable, diag: &mut Diagnostics) -> u32 {
    let mut counts = vec![0u32; g.num_productions()];
    for row in &actions.rows {
        for code in row {
            if code.is_reduce() {
                counts[code.index()] += 1;
            }
        }
    }

    let mut never_reduced = 0;
    for (index, count) in counts.iter().enumerate() {
        if *count == 0 {
            let production = g.production(ProductionID::from_raw(index as u16));
            diag.warning(
                ErrorKind::ProductionNeverReduced,
                format!("production \"{}\" is never reduced", production.display(g)),
            );
            never_reduced += 1;
        }
    }
    never_reduced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Diagnostics,
        grammar::{Grammar, Precedence},
    };

    #[test]
    fn action_encoding_round_trips() {
        for raw in [0u16, 1, 7, 4095] {
            let shift = ActionCode::shift(StateID::from_raw(raw));
            assert!(shift.is_shift());
            assert!(!shift.is_reduce());
            assert_eq!(shift.index(), raw as usize);

            let reduce = ActionCode::reduce(ProductionID::from_raw(raw));
            assert!(reduce.is_reduce());
            assert!(!reduce.is_shift());
            assert_eq!(reduce.index(), raw as usize);
        }
        assert!(!ActionCode::ERROR.is_shift());
        assert!(!ActionCode::ERROR.is_reduce());
    }

    /// Find the state whose item set contains the completed production.
    fn state_with_completed(
        g: &Grammar,
        machine: &Machine,
        production: ProductionID,
    ) -> StateID {
        machine
            .states()
            .find(|(_, state)| {
                state
                    .items()
                    .any(|(item, _)| item.production == production && item.dot_at_end(g))
            })
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn shift_wins_without_precedence() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, None);
            let id = g.terminal("ID", None, None);
            let e = g.nonterminal("E", None);
            let sum = g.production(e, [e.into(), plus.into(), e.into()], None);
            g.production(e, [id.into()], None);
            assert!(sum.is_some());
        });
        let machine = Machine::build(&grammar);
        let tables = fill(&grammar, &machine, &mut diag);

        assert_eq!(tables.num_conflicts, 1);
        assert_eq!(diag.emitted().len(), 1);
        assert_eq!(diag.emitted()[0].kind, ErrorKind::ShiftReduceConflict);

        let sum = ProductionID::from_raw(1);
        let state = state_with_completed(&grammar, &machine, sum);
        let plus = 2; // terminal column after EOF and error
        assert!(tables.actions.get(state.into_raw() as usize, plus).is_shift());
    }

    #[test]
    fn precedence_resolves_silently() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, Some(Precedence::new(1, Assoc::Left)));
            let times = g.terminal("TIMES", None, Some(Precedence::new(2, Assoc::Left)));
            let id = g.terminal("ID", None, None);
            let e = g.nonterminal("E", None);
            g.production(e, [e.into(), plus.into(), e.into()], None);
            g.production(e, [e.into(), times.into(), e.into()], None);
            g.production(e, [id.into()], None);
        });
        let machine = Machine::build(&grammar);
        let tables = fill(&grammar, &machine, &mut diag);

        assert_eq!(tables.num_conflicts, 0);
        assert!(diag.emitted().is_empty());

        let sum = ProductionID::from_raw(1);
        let state = state_with_completed(&grammar, &machine, sum).into_raw() as usize;
        let (plus, times) = (2, 3);
        // left-associative tie reduces; the tighter TIMES shifts
        assert!(tables.actions.get(state, plus).is_reduce());
        assert!(tables.actions.get(state, times).is_shift());

        let product = ProductionID::from_raw(2);
        let state = state_with_completed(&grammar, &machine, product).into_raw() as usize;
        assert!(tables.actions.get(state, plus).is_reduce());
        assert!(tables.actions.get(state, times).is_reduce());
    }

    #[test]
    fn nonassoc_tie_becomes_an_error_entry() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let eq = g.terminal("EQ", None, Some(Precedence::new(1, Assoc::Nonassoc)));
            let id = g.terminal("ID", None, None);
            let e = g.nonterminal("E", None);
            g.production(e, [e.into(), eq.into(), e.into()], None);
            g.production(e, [id.into()], None);
        });
        let machine = Machine::build(&grammar);
        let tables = fill(&grammar, &machine, &mut diag);

        // the nonassoc resolution is reported but not counted
        assert_eq!(tables.num_conflicts, 0);
        assert_eq!(diag.emitted().len(), 1);
        assert_eq!(diag.emitted()[0].kind, ErrorKind::NonassocConflict);

        let comparison = ProductionID::from_raw(1);
        let state = state_with_completed(&grammar, &machine, comparison);
        let eq = 2;
        assert_eq!(
            tables.actions.get(state.into_raw() as usize, eq),
            ActionCode::ERROR
        );
    }

    #[test]
    fn reduce_reduce_prefers_the_earlier_production() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let x = g.terminal("X", None, None);
            let s = g.nonterminal("S", None);
            let a = g.nonterminal("A", None);
            let b = g.nonterminal("B", None);
            g.start_symbol(s);
            g.production(s, [a.into()], None);
            g.production(s, [b.into()], None);
            g.production(a, [x.into()], None);
            g.production(b, [x.into()], None);
        });
        let machine = Machine::build(&grammar);
        let tables = fill(&grammar, &machine, &mut diag);

        assert_eq!(tables.num_conflicts, 1);
        let report = &diag.emitted()[0];
        assert_eq!(report.kind, ErrorKind::ReduceReduceConflict);
        assert!(report.message.contains("A -> [ X . ]"));
        assert!(report.message.contains("B -> [ X . ]"));
        assert!(report.message.contains("EOF"));

        // the state reached after shifting X reduces through A on EOF
        let a_production = ProductionID::from_raw(3);
        let state = state_with_completed(&grammar, &machine, a_production);
        let eof = TerminalID::EOF.into_raw() as usize;
        let code = tables.actions.get(state.into_raw() as usize, eof);
        assert_eq!(code, ActionCode::reduce(a_production));
    }

    #[test]
    fn never_reduced_production_warns_once() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let x = g.terminal("X", None, None);
            let y = g.terminal("Y", None, None);
            let s = g.nonterminal("S", None);
            let dead = g.nonterminal("DEAD", None);
            g.start_symbol(s);
            g.production(s, [x.into()], None);
            g.production(dead, [y.into()], None);
        });
        let machine = Machine::build(&grammar);
        let tables = fill(&grammar, &machine, &mut diag);
        let never_reduced = check_reductions(&grammar, &tables.actions, &mut diag);

        assert_eq!(never_reduced, 1);
        let reports: Vec<_> = diag
            .emitted()
            .iter()
            .filter(|d| d.kind == ErrorKind::ProductionNeverReduced)
            .collect();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].message.contains("DEAD -> Y"));
    }
}
