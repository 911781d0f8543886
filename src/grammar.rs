//! Grammar model: symbols, terminal sets, productions, and the builder
//! that rewrites embedded semantic actions.

use crate::{
    diagnostics::{Diagnostics, ErrorKind},
    first_sets,
    types::{Map, Set},
};
use std::fmt;

// ==== identifiers ====

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TerminalID(u16);

impl TerminalID {
    /// Reserved terminal that marks the end of input.
    pub const EOF: Self = Self(0);
    /// Reserved terminal consumed by error recovery.
    pub const ERROR: Self = Self(1);

    const OFFSET: u16 = 2;

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for TerminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::EOF => write!(f, "T#End"),
            &Self::ERROR => write!(f, "T#Err"),
            _ => write!(f, "T#{:03}", self.0),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NonterminalID(u16);

impl NonterminalID {
    /// Reserved start symbol, the left-hand side of the accept production.
    pub const START: Self = Self(0);

    const OFFSET: u16 = 1;

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for NonterminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::START => write!(f, "N#Start"),
            _ => write!(f, "N#{:03}", self.0),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolID {
    T(TerminalID),
    N(NonterminalID),
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::T(t) => write!(f, "{:?}", t),
            Self::N(n) => write!(f, "{:?}", n),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProductionID(u16);

impl ProductionID {
    /// Reserved production `$START : <start-symbol> EOF`.
    pub const ACCEPT: Self = Self(0);

    const OFFSET: u16 = 1;

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::ACCEPT => write!(f, "P#Accept"),
            _ => write!(f, "P#{:03}", self.0),
        }
    }
}

// ==== terminal sets ====

/// A set of terminal indices backed by a bitmap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}

impl TerminalSet {
    pub fn contains(&self, id: TerminalID) -> bool {
        self.inner.contains(id.0.into())
    }

    pub fn insert(&mut self, id: TerminalID) -> bool {
        self.inner.insert(id.0.into())
    }

    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }

    pub fn intersect_with(&mut self, other: &Self) {
        self.inner.intersect_with(&other.inner)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.inner.is_subset(&other.inner)
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.inner.is_disjoint(&other.inner)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Union `other` into `self`, reporting whether anything was added.
    pub fn add_set(&mut self, other: &Self) -> bool {
        if other.inner.is_subset(&self.inner) {
            return false;
        }
        self.inner.union_with(&other.inner);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        // every bit was inserted through a TerminalID, so raw fits in u16
        self.inner.iter().map(|raw| {
            debug_assert!(raw <= u16::MAX as usize);
            TerminalID(raw as u16)
        })
    }
}

impl FromIterator<TerminalID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TerminalID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.0.into()).collect(),
        }
    }
}

// ==== precedence ====

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Precedence {
    pub priority: u16,
    pub assoc: Assoc,
}

impl Precedence {
    pub const fn new(priority: u16, assoc: Assoc) -> Self {
        Self { priority, assoc }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

// ==== symbol data ====

#[derive(Debug)]
#[non_exhaustive]
pub struct TerminalData {
    pub name: String,
    /// Type tag of the semantic value carried by this terminal, opaque to
    /// the analysis and handed through to the emitter.
    pub content_type: Option<String>,
    pub precedence: Option<Precedence>,
    pub(crate) uses: u32,
}

impl TerminalData {
    pub fn is_used(&self) -> bool {
        self.uses > 0
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub struct NonterminalData {
    pub name: String,
    pub content_type: Option<String>,
    /// Set for the hidden symbols synthesized while factoring out embedded
    /// actions.
    pub is_embedded_action: bool,
    pub(crate) productions: Vec<ProductionID>,
    pub(crate) uses: u32,
}

impl NonterminalData {
    /// Productions with this nonterminal on the left-hand side.
    pub fn productions(&self) -> &[ProductionID] {
        &self.productions
    }

    pub fn is_used(&self) -> bool {
        self.uses > 0
    }
}

// ==== productions ====

/// One element of a raw right-hand side: a grammar symbol or an embedded
/// action payload.
#[derive(Debug, Clone)]
pub enum RhsPart {
    Symbol(SymbolID),
    Action(String),
}

impl RhsPart {
    pub fn action(code: impl Into<String>) -> Self {
        Self::Action(code.into())
    }
}

impl From<TerminalID> for RhsPart {
    fn from(id: TerminalID) -> Self {
        Self::Symbol(SymbolID::T(id))
    }
}

impl From<NonterminalID> for RhsPart {
    fn from(id: NonterminalID) -> Self {
        Self::Symbol(SymbolID::N(id))
    }
}

impl From<SymbolID> for RhsPart {
    fn from(id: SymbolID) -> Self {
        Self::Symbol(id)
    }
}

/// Bookkeeping carried by a production synthesized for an embedded action.
#[derive(Debug, Copy, Clone)]
pub struct EmbeddedAction {
    /// The production the action was factored out of.
    pub base: ProductionID,
    /// Position of the action in the rewritten right-hand side of the base
    /// production, which is also the number of values below it on the
    /// semantic stack when the empty reduce fires.
    pub index_of_action: u16,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct Production {
    pub lhs: NonterminalID,
    /// Right-hand side after rewriting: symbols only, no actions.
    pub rhs: Vec<SymbolID>,
    /// Reduce action payload, opaque to the analysis.
    pub action: Option<String>,
    pub precedence: Option<Precedence>,
    pub embedded: Option<EmbeddedAction>,
    /// Right-hand-side index of the nearest embedded action to the left,
    /// or -1; lets the emitter resolve intermediate `$k` results.
    pub index_of_intermediate_result: i32,
    pub(crate) nullable: bool,
}

impl Production {
    pub fn rhs_length(&self) -> usize {
        self.rhs.len()
    }

    /// Number of values popped off the parse stack when reducing.
    pub fn stack_depth(&self) -> usize {
        match self.embedded {
            Some(embedded) => embedded.index_of_action as usize,
            None => self.rhs.len(),
        }
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        ProductionDisplay {
            grammar: g,
            production: self,
        }
    }
}

struct ProductionDisplay<'g> {
    grammar: &'g Grammar,
    production: &'g Production,
}

impl fmt::Display for ProductionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            grammar,
            production,
        } = self;
        write!(f, "{} ->", grammar.nonterminal(production.lhs).name)?;
        if production.rhs.is_empty() {
            f.write_str(" ε")?;
        } else {
            for symbol in &production.rhs {
                write!(f, " {}", grammar.symbol_name(*symbol))?;
            }
        }
        Ok(())
    }
}

// ==== grammar ====

/// The grammar aggregate every analysis phase is handed.  Construction
/// happens once through [`Grammar::define`]; afterwards the symbol and
/// production tables, the nullability marks, and the FIRST sets are
/// frozen.
#[derive(Debug)]
#[non_exhaustive]
pub struct Grammar {
    pub terminals: Map<TerminalID, TerminalData>,
    pub nonterminals: Map<NonterminalID, NonterminalData>,
    pub productions: Map<ProductionID, Production>,
    pub start_symbol: NonterminalID,
    pub(crate) nullables: Set<NonterminalID>,
    pub(crate) first_sets: Map<NonterminalID, TerminalSet>,
}

impl Grammar {
    /// Define a grammar using the specified function.  Problems found
    /// while building (redeclarations, unknown symbols, ambiguous
    /// precedence) are recorded in `diag` and construction continues.
    pub fn define<F>(diag: &mut Diagnostics, f: F) -> Self
    where
        F: FnOnce(&mut GrammarDef<'_>),
    {
        let mut def = GrammarDef {
            diag,
            terminals: Map::default(),
            nonterminals: Map::default(),
            productions: Map::default(),
            start: None,
            next_terminal: TerminalID::OFFSET,
            next_nonterminal: NonterminalID::OFFSET,
            next_production: ProductionID::OFFSET,
            next_hidden: 1,
        };

        def.terminals.insert(
            TerminalID::EOF,
            TerminalData {
                name: "EOF".into(),
                content_type: None,
                precedence: None,
                uses: 0,
            },
        );
        def.terminals.insert(
            TerminalID::ERROR,
            TerminalData {
                name: "error".into(),
                content_type: None,
                precedence: None,
                uses: 0,
            },
        );
        def.nonterminals.insert(
            NonterminalID::START,
            NonterminalData {
                name: "$START".into(),
                content_type: None,
                is_embedded_action: false,
                productions: Vec::new(),
                uses: 0,
            },
        );

        f(&mut def);

        def.end()
    }

    pub fn terminal(&self, id: TerminalID) -> &TerminalData {
        &self.terminals[&id]
    }

    pub fn nonterminal(&self, id: NonterminalID) -> &NonterminalData {
        &self.nonterminals[&id]
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[&id]
    }

    pub fn num_terminals(&self) -> usize {
        self.terminals.len()
    }

    pub fn num_nonterminals(&self) -> usize {
        self.nonterminals.len()
    }

    pub fn num_productions(&self) -> usize {
        self.productions.len()
    }

    pub fn symbol_name(&self, id: SymbolID) -> &str {
        match id {
            SymbolID::T(t) => &self.terminal(t).name,
            SymbolID::N(n) => &self.nonterminal(n).name,
        }
    }

    pub fn is_nullable(&self, id: NonterminalID) -> bool {
        self.nullables.contains(&id)
    }

    /// FIRST set of the nonterminal, fixed at construction time.
    pub fn first_set(&self, id: NonterminalID) -> &TerminalSet {
        &self.first_sets[&id]
    }

    /// FIRST set of the right-hand-side suffix of `production` starting at
    /// symbol position `from`.
    pub fn suffix_first(&self, production: ProductionID, from: usize) -> TerminalSet {
        let rhs = &self.production(production).rhs;
        first_sets::rhs_first(&rhs[from.min(rhs.len())..], &self.first_sets, &self.nullables)
    }

    /// Whether every symbol of the suffix can derive the empty string.
    pub fn suffix_nullable(&self, production: ProductionID, from: usize) -> bool {
        let rhs = &self.production(production).rhs;
        first_sets::rhs_nullable(&rhs[from.min(rhs.len())..], &self.nullables)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminals:")?;
        for t in self.terminals.values() {
            write!(f, " {}", t.name)?;
        }
        write!(f, "\nnonterminals:")?;
        for n in self.nonterminals.values() {
            write!(f, " {}", n.name)?;
        }
        writeln!(
            f,
            "\nstart symbol: {}",
            self.nonterminal(self.start_symbol).name
        )?;
        writeln!(f, "productions:")?;
        let mut by_index: Vec<_> = self.productions.iter().collect();
        by_index.sort_unstable_by_key(|(id, _)| **id);
        for (id, production) in by_index {
            writeln!(f, "  [{:02}] {}", id.into_raw(), production.display(self))?;
        }
        Ok(())
    }
}

// ==== builder ====

/// The contextual values for building a [`Grammar`].
#[derive(Debug)]
pub struct GrammarDef<'d> {
    diag: &'d mut Diagnostics,
    terminals: Map<TerminalID, TerminalData>,
    nonterminals: Map<NonterminalID, NonterminalData>,
    productions: Map<ProductionID, Production>,
    start: Option<NonterminalID>,
    next_terminal: u16,
    next_nonterminal: u16,
    next_production: u16,
    next_hidden: u32,
}

impl GrammarDef<'_> {
    /// Declare a terminal symbol.
    pub fn terminal(
        &mut self,
        name: impl Into<String>,
        content_type: Option<&str>,
        precedence: Option<Precedence>,
    ) -> TerminalID {
        let name = name.into();
        if let Some(existing) = self.check_redeclared(&name) {
            if let SymbolID::T(t) = existing {
                return t;
            }
        }
        let id = TerminalID(self.next_terminal);
        self.next_terminal += 1;
        self.terminals.insert(
            id,
            TerminalData {
                name,
                content_type: content_type.map(str::to_owned),
                precedence,
                uses: 0,
            },
        );
        id
    }

    /// Declare a nonterminal symbol.
    pub fn nonterminal(
        &mut self,
        name: impl Into<String>,
        content_type: Option<&str>,
    ) -> NonterminalID {
        let name = name.into();
        if let Some(existing) = self.check_redeclared(&name) {
            if let SymbolID::N(n) = existing {
                return n;
            }
        }
        self.insert_nonterminal(name, content_type.map(str::to_owned), false)
    }

    fn insert_nonterminal(
        &mut self,
        name: String,
        content_type: Option<String>,
        is_embedded_action: bool,
    ) -> NonterminalID {
        let id = NonterminalID(self.next_nonterminal);
        self.next_nonterminal += 1;
        self.nonterminals.insert(
            id,
            NonterminalData {
                name,
                content_type,
                is_embedded_action,
                productions: Vec::new(),
                uses: 0,
            },
        );
        id
    }

    fn check_redeclared(&mut self, name: &str) -> Option<SymbolID> {
        let found = self
            .terminals
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(id, _)| SymbolID::T(*id))
            .or_else(|| {
                self.nonterminals
                    .iter()
                    .find(|(_, n)| n.name == name)
                    .map(|(id, _)| SymbolID::N(*id))
            });
        if found.is_some() {
            self.diag.error(
                ErrorKind::SymbolRedeclared,
                format!("symbol \"{}\" declared more than once", name),
            );
        }
        found
    }

    /// Specify the start symbol.  Defaults to the first declared
    /// nonterminal when never called.
    pub fn start_symbol(&mut self, symbol: NonterminalID) {
        self.start.replace(symbol);
    }

    /// Add a production.  The right-hand side may interleave symbols with
    /// embedded action payloads; every action except a trailing one is
    /// factored out into a hidden nonterminal with a single empty
    /// production, so that all surviving actions fire on a reduce.
    ///
    /// `prec` names the `%prec` terminal whose precedence the production
    /// copies; without it the rightmost precedence-carrying terminal of
    /// the right-hand side decides.
    ///
    /// Returns `None` when the production had to be dropped because it
    /// referenced an undeclared symbol.
    pub fn production<I>(
        &mut self,
        lhs: NonterminalID,
        rhs: I,
        prec: Option<TerminalID>,
    ) -> Option<ProductionID>
    where
        I: IntoIterator<Item = RhsPart>,
    {
        // Merge adjacent action payloads before any factoring.
        let mut parts: Vec<RhsPart> = Vec::new();
        for part in rhs {
            if let RhsPart::Action(code) = &part {
                if let Some(RhsPart::Action(merged)) = parts.last_mut() {
                    merged.push_str(code);
                    continue;
                }
            }
            parts.push(part);
        }

        if !self.nonterminals.contains_key(&lhs) {
            self.diag.error(
                ErrorKind::UnknownSymbol,
                "production dropped: unknown left-hand-side symbol".to_owned(),
            );
            return None;
        }
        for part in &parts {
            let known = match part {
                RhsPart::Symbol(SymbolID::T(t)) => self.terminals.contains_key(t),
                RhsPart::Symbol(SymbolID::N(n)) => self.nonterminals.contains_key(n),
                RhsPart::Action(_) => true,
            };
            if !known {
                self.diag.error(
                    ErrorKind::UnknownSymbol,
                    format!(
                        "production of \"{}\" dropped: unknown right-hand-side symbol",
                        self.nonterminals[&lhs].name
                    ),
                );
                return None;
            }
        }

        let explicit_prec = match prec {
            Some(t) => match self.terminals.get(&t) {
                Some(data) => Some(data.precedence),
                None => {
                    self.diag.error(
                        ErrorKind::UnknownSymbol,
                        format!(
                            "production of \"{}\": unknown %prec terminal ignored",
                            self.nonterminals[&lhs].name
                        ),
                    );
                    None
                }
            },
            None => None,
        };

        let action = if matches!(parts.last(), Some(RhsPart::Action(_))) {
            match parts.pop() {
                Some(RhsPart::Action(code)) => Some(code),
                _ => None,
            }
        } else {
            None
        };

        let id = ProductionID(self.next_production);
        self.next_production += 1;

        let mut symbols = Vec::with_capacity(parts.len());
        let mut last_embedded = -1i32;
        for part in parts {
            match part {
                RhsPart::Symbol(symbol) => {
                    self.note_use(symbol);
                    symbols.push(symbol);
                }
                RhsPart::Action(code) => {
                    let index_of_action = symbols.len() as u16;
                    let hidden = self.insert_nonterminal(
                        format!("NT${}", self.next_hidden),
                        None,
                        true,
                    );
                    self.next_hidden += 1;
                    let hidden_production = ProductionID(self.next_production);
                    self.next_production += 1;
                    self.productions.insert(
                        hidden_production,
                        Production {
                            lhs: hidden,
                            rhs: Vec::new(),
                            action: Some(code),
                            precedence: None,
                            embedded: Some(EmbeddedAction {
                                base: id,
                                index_of_action,
                            }),
                            index_of_intermediate_result: last_embedded,
                            nullable: false,
                        },
                    );
                    self.nonterminals[&hidden].productions.push(hidden_production);
                    self.note_use(SymbolID::N(hidden));
                    last_embedded = symbols.len() as i32;
                    symbols.push(SymbolID::N(hidden));
                }
            }
        }

        let precedence = match explicit_prec {
            Some(precedence) => precedence,
            None => self.rhs_precedence(lhs, &symbols),
        };

        self.productions.insert(
            id,
            Production {
                lhs,
                rhs: symbols,
                action,
                precedence,
                embedded: None,
                index_of_intermediate_result: last_embedded,
                nullable: false,
            },
        );
        self.nonterminals[&lhs].productions.push(id);

        Some(id)
    }

    /// Production precedence without an explicit `%prec`: the rightmost
    /// right-hand-side terminal carrying one decides, and carrying more
    /// than one distinct level is an error.
    fn rhs_precedence(
        &mut self,
        lhs: NonterminalID,
        rhs: &[SymbolID],
    ) -> Option<Precedence> {
        let mut carried = rhs.iter().rev().filter_map(|symbol| match symbol {
            SymbolID::T(t) => self.terminals[t].precedence,
            SymbolID::N(_) => None,
        });
        let rightmost = carried.next()?;
        if carried.any(|other| other.priority != rightmost.priority) {
            self.diag.error(
                ErrorKind::ProductionPrecedenceAmbiguous,
                format!(
                    "production of \"{}\" has more than one precedence terminal",
                    self.nonterminals[&lhs].name
                ),
            );
        }
        Some(rightmost)
    }

    fn note_use(&mut self, symbol: SymbolID) {
        match symbol {
            SymbolID::T(t) => self.terminals[&t].uses += 1,
            SymbolID::N(n) => self.nonterminals[&n].uses += 1,
        }
    }

    fn end(mut self) -> Grammar {
        let start = match self.start.take() {
            Some(start) => start,
            None => {
                let first = self
                    .nonterminals
                    .keys()
                    .find(|id| **id != NonterminalID::START)
                    .copied();
                match first {
                    Some(first) => first,
                    None => {
                        // keep going with a degenerate start symbol so the
                        // rest of the run can still surface diagnostics
                        self.diag.error(
                            ErrorKind::UnknownSymbol,
                            "the grammar declares no nonterminal symbol to start from",
                        );
                        NonterminalID::START
                    }
                }
            }
        };

        self.note_use(SymbolID::N(start));
        self.productions.insert(
            ProductionID::ACCEPT,
            Production {
                lhs: NonterminalID::START,
                rhs: vec![SymbolID::N(start), SymbolID::T(TerminalID::EOF)],
                action: None,
                precedence: None,
                embedded: None,
                index_of_intermediate_result: -1,
                nullable: false,
            },
        );
        self.nonterminals[&NonterminalID::START]
            .productions
            .push(ProductionID::ACCEPT);

        let nullables = first_sets::nullable_nonterminals(&self.productions);
        for production in self.productions.values_mut() {
            production.nullable = first_sets::rhs_nullable(&production.rhs, &nullables);
        }
        let first_sets =
            first_sets::first_sets(&self.nonterminals, &self.productions, &nullables);

        Grammar {
            terminals: self.terminals,
            nonterminals: self.nonterminals,
            productions: self.productions,
            start_symbol: start,
            nullables,
            first_sets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_action_is_factored_out() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let a = g.nonterminal("A", None);
            let b = g.nonterminal("B", None);
            let c = g.nonterminal("C", None);
            g.start_symbol(a);
            g.production(
                a,
                [b.into(), RhsPart::action("act1"), c.into()],
                None,
            );
        });
        assert_eq!(diag.error_count(), 0);

        let base = grammar
            .productions
            .values()
            .find(|p| p.lhs == grammar.start_symbol && p.embedded.is_none())
            .unwrap();
        assert_eq!(base.rhs.len(), 3);
        assert_eq!(base.action, None);
        assert_eq!(base.index_of_intermediate_result, 1);
        assert_eq!(base.stack_depth(), 3);

        let SymbolID::N(hidden) = base.rhs[1] else {
            panic!("expected a hidden nonterminal in the middle");
        };
        let hidden_data = grammar.nonterminal(hidden);
        assert!(hidden_data.is_embedded_action);
        assert_eq!(hidden_data.name, "NT$1");

        let synthesized = grammar.production(hidden_data.productions()[0]);
        assert!(synthesized.rhs.is_empty());
        assert_eq!(synthesized.action.as_deref(), Some("act1"));
        let embedded = synthesized.embedded.unwrap();
        assert_eq!(embedded.index_of_action, 1);
        assert_eq!(synthesized.index_of_intermediate_result, -1);
        assert_eq!(synthesized.stack_depth(), 1);
    }

    #[test]
    fn adjacent_actions_merge() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let a = g.nonterminal("A", None);
            let x = g.terminal("X", None, None);
            g.production(
                a,
                [
                    x.into(),
                    RhsPart::action("one;"),
                    RhsPart::action("two;"),
                ],
                None,
            );
        });
        let production = grammar
            .productions
            .values()
            .find(|p| p.lhs != NonterminalID::START)
            .unwrap();
        // a trailing merged action stays on the production itself
        assert_eq!(production.action.as_deref(), Some("one;two;"));
        assert_eq!(production.rhs.len(), 1);
    }

    #[test]
    fn precedence_from_rightmost_terminal() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, Some(Precedence::new(1, Assoc::Left)));
            let e = g.nonterminal("E", None);
            let id = g.terminal("ID", None, None);
            g.production(e, [e.into(), plus.into(), e.into()], None);
            g.production(e, [id.into()], None);
        });
        assert_eq!(diag.error_count(), 0);

        let sum = grammar
            .productions
            .values()
            .find(|p| p.rhs.len() == 3)
            .unwrap();
        assert_eq!(sum.precedence, Some(Precedence::new(1, Assoc::Left)));
        let atom = grammar
            .productions
            .values()
            .find(|p| p.rhs.len() == 1 && p.lhs != NonterminalID::START)
            .unwrap();
        assert_eq!(atom.precedence, None);
    }

    #[test]
    fn conflicting_rhs_precedences_are_an_error() {
        let mut diag = Diagnostics::new();
        Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, Some(Precedence::new(1, Assoc::Left)));
            let times = g.terminal("TIMES", None, Some(Precedence::new(2, Assoc::Left)));
            let e = g.nonterminal("E", None);
            g.production(e, [e.into(), plus.into(), e.into(), times.into()], None);
        });
        assert_eq!(diag.error_count(), 1);
        assert_eq!(
            diag.emitted()[0].kind,
            ErrorKind::ProductionPrecedenceAmbiguous
        );
    }

    #[test]
    fn explicit_prec_overrides_and_silences_ambiguity() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let plus = g.terminal("PLUS", None, Some(Precedence::new(1, Assoc::Left)));
            let times = g.terminal("TIMES", None, Some(Precedence::new(2, Assoc::Left)));
            let e = g.nonterminal("E", None);
            g.production(
                e,
                [e.into(), plus.into(), e.into(), times.into()],
                Some(plus),
            );
        });
        assert_eq!(diag.error_count(), 0);
        let production = grammar
            .productions
            .values()
            .find(|p| p.rhs.len() == 4)
            .unwrap();
        assert_eq!(production.precedence, Some(Precedence::new(1, Assoc::Left)));
    }

    #[test]
    fn redeclaration_reports_and_returns_existing() {
        let mut diag = Diagnostics::new();
        Grammar::define(&mut diag, |g| {
            let first = g.terminal("X", None, None);
            let second = g.terminal("X", None, None);
            assert_eq!(first, second);
            let _ = g.nonterminal("A", None);
        });
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.emitted()[0].kind, ErrorKind::SymbolRedeclared);
    }

    #[test]
    fn empty_grammar_reports_instead_of_panicking() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |_| {});
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.emitted()[0].kind, ErrorKind::UnknownSymbol);
        // the run degenerates to the reserved start symbol but survives
        assert_eq!(grammar.start_symbol, NonterminalID::START);
        assert_eq!(grammar.num_productions(), 1);
    }

    #[test]
    fn unknown_rhs_symbol_drops_the_production() {
        let mut diag = Diagnostics::new();
        let grammar = Grammar::define(&mut diag, |g| {
            let a = g.nonterminal("A", None);
            let bogus = TerminalID::from_raw(40);
            assert!(g.production(a, [bogus.into()], None).is_none());
            let x = g.terminal("X", None, None);
            g.production(a, [x.into()], None);
        });
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.emitted()[0].kind, ErrorKind::UnknownSymbol);
        // only the valid production and the accept production survive
        assert_eq!(grammar.num_productions(), 2);
    }
}
