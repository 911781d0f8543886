//! The LALR(1) viable-prefix recognition machine.
//!
//! States are canonicalized by their kernel item set; lookahead sets live
//! in an arena of cells connected by propagation edges, so that a union
//! into one cell flows transitively into every cell reachable from it
//! (the graph may contain cycles).  Because unions fire eagerly through
//! the edges, the machine is complete as soon as the work list drains; no
//! separate propagation pass runs afterwards.

use crate::{
    grammar::{Grammar, ProductionID, SymbolID, TerminalID, TerminalSet},
    types::Map,
};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateID(u16);

impl StateID {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}

/// An LR item: a production with a marker position in its right-hand
/// side.  Items are plain values, equal on the `(production, dot)` pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item {
    pub production: ProductionID,
    pub dot: u16,
}

impl Item {
    pub fn start(production: ProductionID) -> Self {
        Self { production, dot: 0 }
    }

    /// The item with the dot advanced past one symbol.
    pub fn shifted(self) -> Self {
        Self {
            production: self.production,
            dot: self.dot + 1,
        }
    }

    pub fn symbol_after_dot(self, g: &Grammar) -> Option<SymbolID> {
        g.production(self.production)
            .rhs
            .get(self.dot as usize)
            .copied()
    }

    pub fn dot_at_end(self, g: &Grammar) -> bool {
        self.dot as usize >= g.production(self.production).rhs.len()
    }

    /// FIRST of everything from the dot to the end of the production.
    pub fn calc_lookahead(self, g: &Grammar) -> TerminalSet {
        g.suffix_first(self.production, self.dot as usize)
    }

    /// Whether everything from the dot onwards can derive the empty
    /// string; if so, lookaheads of the producing item must flow into the
    /// items created by closing it.
    pub fn is_nullable(self, g: &Grammar) -> bool {
        g.suffix_nullable(self.production, self.dot as usize)
    }

    pub fn display<'g>(self, g: &'g Grammar) -> impl fmt::Display + 'g {
        ItemDisplay {
            grammar: g,
            item: self,
        }
    }
}

struct ItemDisplay<'g> {
    grammar: &'g Grammar,
    item: Item,
}

impl fmt::Display for ItemDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        let production = g.production(self.item.production);
        write!(f, "{} -> [", g.nonterminal(production.lhs).name)?;
        for (i, symbol) in production.rhs.iter().enumerate() {
            if i == self.item.dot as usize {
                f.write_str(" .")?;
            }
            write!(f, " {}", g.symbol_name(*symbol))?;
        }
        if production.rhs.len() == self.item.dot as usize {
            f.write_str(" .")?;
        }
        f.write_str(" ]")
    }
}

// ==== lookahead cells ====

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CellId(u32);

#[derive(Debug)]
struct Cell {
    terminals: TerminalSet,
    successors: Vec<CellId>,
}

/// Arena of lookahead cells.  Each cell owns a terminal set and the edges
/// along which later additions must propagate.
#[derive(Debug, Default)]
pub struct LookaheadStore {
    cells: Vec<Cell>,
}

impl LookaheadStore {
    fn alloc(&mut self, terminals: TerminalSet) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Cell {
            terminals,
            successors: Vec::new(),
        });
        id
    }

    pub fn terminals(&self, id: CellId) -> &TerminalSet {
        &self.cells[id.0 as usize].terminals
    }

    /// Record that additions to `from` must also reach `to`.
    fn link(&mut self, from: CellId, to: CellId) {
        self.cells[from.0 as usize].successors.push(to);
    }

    /// Union `added` into the cell and push the newly added terminals
    /// through the propagation edges until nothing grows any more.
    fn add(&mut self, id: CellId, added: &TerminalSet) -> bool {
        if !self.cells[id.0 as usize].terminals.add_set(added) {
            return false;
        }
        let mut work = self.cells[id.0 as usize].successors.clone();
        while let Some(next) = work.pop() {
            if self.cells[next.0 as usize].terminals.add_set(added) {
                work.extend_from_slice(&self.cells[next.0 as usize].successors);
            }
        }
        true
    }
}

// ==== states ====

/// One state of the machine: the closed item set, each item paired with
/// its lookahead cell, plus the outgoing transitions in creation order.
#[derive(Debug)]
pub struct State {
    pub(crate) items: Map<Item, CellId>,
    pub(crate) transitions: Vec<(SymbolID, StateID)>,
}

impl State {
    pub fn items(&self) -> impl Iterator<Item = (Item, CellId)> + '_ {
        self.items.iter().map(|(item, cell)| (*item, *cell))
    }

    pub fn transitions(&self) -> &[(SymbolID, StateID)] {
        &self.transitions
    }
}

#[derive(Debug)]
pub struct Machine {
    states: Vec<State>,
    lookaheads: LookaheadStore,
}

impl Machine {
    /// Build the machine for a grammar whose analysis phases (rewriting,
    /// nullability, FIRST) have completed.
    pub fn build(g: &Grammar) -> Self {
        let mut builder = Builder {
            g,
            states: Vec::new(),
            kernels: Map::default(),
            store: LookaheadStore::default(),
        };

        // seed: the accept production with the dot at the front and EOF
        // as the expected lookahead
        let lookahead: TerminalSet = Some(TerminalID::EOF).into_iter().collect();
        builder.get_state(vec![(Item::start(ProductionID::ACCEPT), lookahead)]);

        // the state vector doubles as the work list; it keeps growing
        // while states are processed in index order
        let mut index = 0;
        while index < builder.states.len() {
            builder.closure(index);
            builder.successors(index);
            index += 1;
        }

        tracing::debug!(
            num_states = builder.states.len(),
            num_cells = builder.store.cells.len(),
            "LALR machine constructed"
        );

        Self {
            states: builder.states,
            lookaheads: builder.store,
        }
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> impl Iterator<Item = (StateID, &State)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(index, state)| (StateID(index as u16), state))
    }

    pub fn state(&self, id: StateID) -> &State {
        &self.states[id.0 as usize]
    }

    pub fn lookahead(&self, cell: CellId) -> &TerminalSet {
        self.lookaheads.terminals(cell)
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        MachineDisplay {
            grammar: g,
            machine: self,
        }
    }
}

struct MachineDisplay<'g> {
    grammar: &'g Grammar,
    machine: &'g Machine,
}

impl fmt::Display for MachineDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        for (id, state) in self.machine.states() {
            writeln!(f, "#### {:?}", id)?;
            for (item, cell) in state.items() {
                write!(f, "- {}  {{", item.display(g))?;
                for (i, t) in self.machine.lookahead(cell).iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str(&g.terminal(t).name)?;
                }
                f.write_str("}\n")?;
            }
            for (symbol, next) in state.transitions() {
                writeln!(f, "- {} => {:?}", g.symbol_name(*symbol), next)?;
            }
        }
        Ok(())
    }
}

// ==== builder ====

struct Builder<'g> {
    g: &'g Grammar,
    states: Vec<State>,
    /// States keyed by their kernel item set.  The kernel (the shifted
    /// items, plus the start item) uniquely identifies a state.
    kernels: Map<Vec<Item>, StateID>,
    store: LookaheadStore,
}

impl Builder<'_> {
    /// Find or create the state with the given kernel.  A hit unions the
    /// supplied lookaheads into the existing cells, propagating through
    /// their edges; a miss allocates a fresh state that the main loop will
    /// process later.
    fn get_state(&mut self, kernel: Vec<(Item, TerminalSet)>) -> StateID {
        let mut key: Vec<Item> = kernel.iter().map(|(item, _)| *item).collect();
        key.sort_unstable();

        if let Some(&found) = self.kernels.get(&key) {
            for (item, lookahead) in kernel {
                let cell = self.states[found.0 as usize].items[&item];
                self.store.add(cell, &lookahead);
            }
            return found;
        }

        let id = StateID(self.states.len() as u16);
        let mut items = Map::default();
        for (item, lookahead) in kernel {
            let cell = self.store.alloc(lookahead);
            items.insert(item, cell);
        }
        self.states.push(State {
            items,
            transitions: Vec::new(),
        });
        self.kernels.insert(key, id);
        id
    }

    /// Close the item set: for every `[A -> α . B β, L]` and every
    /// production of B, make sure `[B -> . γ]` is present with lookahead
    /// `FIRST(β)`, extended by L itself when β is nullable — in which case
    /// a propagation edge keeps later additions to L flowing in.
    fn closure(&mut self, index: usize) {
        let mut consider: Vec<Item> = self.states[index].items.keys().copied().collect();

        while let Some(item) = consider.pop() {
            let Some(SymbolID::N(nt)) = item.symbol_after_dot(self.g) else {
                continue;
            };

            let shifted = item.shifted();
            let mut lookahead = shifted.calc_lookahead(self.g);
            let need_prop = shifted.is_nullable(self.g);
            let source = self.states[index].items[&item];
            if need_prop {
                lookahead.union_with(self.store.terminals(source));
            }

            for &production in self.g.nonterminal(nt).productions() {
                let new_item = Item::start(production);
                let target = match self.states[index].items.get(&new_item).copied() {
                    Some(cell) => {
                        self.store.add(cell, &lookahead);
                        cell
                    }
                    None => {
                        let cell = self.store.alloc(lookahead.clone());
                        self.states[index].items.insert(new_item, cell);
                        consider.push(new_item);
                        cell
                    }
                };
                if need_prop {
                    self.store.link(source, target);
                }
            }
        }
    }

    /// Group the items on their symbol after the dot and realize one
    /// successor state per symbol, wiring a propagation edge from every
    /// contributing item to its shifted counterpart.
    fn successors(&mut self, index: usize) {
        let mut outgoing: Map<SymbolID, Vec<Item>> = Map::default();
        for (&item, _) in &self.states[index].items {
            if let Some(symbol) = item.symbol_after_dot(self.g) {
                outgoing.entry(symbol).or_default().push(item);
            }
        }

        let mut transitions = Vec::with_capacity(outgoing.len());
        for (symbol, items) in outgoing {
            let mut kernel = Vec::with_capacity(items.len());
            for &item in &items {
                let cell = self.states[index].items[&item];
                kernel.push((item.shifted(), self.store.terminals(cell).clone()));
            }
            let next = self.get_state(kernel);

            for &item in &items {
                let from = self.states[index].items[&item];
                let to = self.states[next.0 as usize].items[&item.shifted()];
                self.store.link(from, to);
            }
            transitions.push((symbol, next));
        }

        self.states[index].transitions = transitions;
    }
}
