//! Nullability and FIRST-set fixed points.
//!
//! Both computations are monotone over finite sets, so the change-flag
//! loops below terminate; iteration order over the insertion-ordered maps
//! keeps the results reproducible run to run.

use crate::{
    grammar::{NonterminalData, NonterminalID, Production, ProductionID, SymbolID, TerminalSet},
    types::{Map, Set},
};

/// Calculate the set of nullable nonterminals: the least fixed point of
/// "some production's right-hand side consists of nullable nonterminals
/// only".
pub(crate) fn nullable_nonterminals(
    productions: &Map<ProductionID, Production>,
) -> Set<NonterminalID> {
    let mut nullables = Set::default();
    loop {
        let mut changed = false;
        for production in productions.values() {
            if production
                .rhs
                .iter()
                .all(|s| matches!(s, SymbolID::N(n) if nullables.contains(n)))
            {
                changed |= nullables.insert(production.lhs);
            }
        }
        if !changed {
            break;
        }
    }
    nullables
}

/// Whether every symbol of `rhs` can derive the empty string.
pub(crate) fn rhs_nullable(rhs: &[SymbolID], nullables: &Set<NonterminalID>) -> bool {
    rhs.iter()
        .all(|s| matches!(s, SymbolID::N(n) if nullables.contains(n)))
}

/// Calculate the FIRST sets of all nonterminals.  Nullability must have
/// been computed beforehand.
pub(crate) fn first_sets(
    nonterminals: &Map<NonterminalID, NonterminalData>,
    productions: &Map<ProductionID, Production>,
    nullables: &Set<NonterminalID>,
) -> Map<NonterminalID, TerminalSet> {
    let mut map: Map<NonterminalID, TerminalSet> = Map::default();
    for &id in nonterminals.keys() {
        map.insert(id, TerminalSet::default());
    }

    loop {
        let mut changed = false;
        for production in productions.values() {
            let first = rhs_first(&production.rhs, &map, nullables);
            changed |= map[&production.lhs].add_set(&first);
        }
        if !changed {
            break;
        }
    }

    map
}

/// FIRST set of a symbol string under the current (possibly still
/// growing) nonterminal FIRST sets: scan left to right, stopping at the
/// first symbol that cannot derive the empty string.
pub(crate) fn rhs_first(
    rhs: &[SymbolID],
    first: &Map<NonterminalID, TerminalSet>,
    nullables: &Set<NonterminalID>,
) -> TerminalSet {
    let mut result = TerminalSet::default();
    for symbol in rhs {
        match symbol {
            SymbolID::T(t) => {
                result.insert(*t);
                break;
            }
            SymbolID::N(n) => {
                result.union_with(&first[n]);
                if !nullables.contains(n) {
                    break;
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::{
        diagnostics::Diagnostics,
        grammar::{Grammar, TerminalID},
    };

    #[test]
    fn nullable_chain() {
        // A -> B C ; B -> ε ; C -> ε
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let a = g.nonterminal("A", None);
            let b = g.nonterminal("B", None);
            let c = g.nonterminal("C", None);
            g.start_symbol(a);
            g.production(a, [b.into(), c.into()], None);
            g.production(b, [], None);
            g.production(c, [], None);
        });

        assert_eq!(grammar.nonterminal(grammar.start_symbol).name, "A");
        let names: Vec<_> = grammar
            .nonterminals
            .iter()
            .filter(|(id, _)| grammar.is_nullable(**id))
            .map(|(_, data)| data.name.as_str())
            .collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert!(grammar.first_set(grammar.start_symbol).is_empty());
        for production in grammar.productions.values() {
            if production.lhs == grammar.start_symbol {
                assert!(production.nullable());
            }
        }
    }

    #[test]
    fn first_passes_through_nullable_prefixes() {
        // S -> A x ; A -> ε | y
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let x = g.terminal("X", None, None);
            let y = g.terminal("Y", None, None);
            let s = g.nonterminal("S", None);
            let a = g.nonterminal("A", None);
            g.start_symbol(s);
            g.production(s, [a.into(), x.into()], None);
            g.production(a, [], None);
            g.production(a, [y.into()], None);
        });

        let s = grammar.start_symbol;
        let first: Vec<_> = grammar.first_set(s).iter().collect();
        let names: Vec<_> = first
            .iter()
            .map(|t| grammar.terminal(*t).name.as_str())
            .collect();
        assert_eq!(names, ["X", "Y"]);
    }

    #[test]
    fn first_sets_are_monotone_across_iterations() {
        // Left recursion forces more than one pass: E -> E x | y
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let x = g.terminal("X", None, None);
            let y = g.terminal("Y", None, None);
            let e = g.nonterminal("E", None);
            g.production(e, [e.into(), x.into()], None);
            g.production(e, [y.into()], None);
        });
        let e = grammar.start_symbol;
        assert!(grammar
            .first_set(e)
            .contains(TerminalID::from_raw(3)));
        assert!(!grammar.is_nullable(e));
    }
}
