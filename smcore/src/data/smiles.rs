use std::collections::{BTreeMap, VecDeque};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CoreError, Result};

const TOKEN_PATTERN: &str = r"\[[^\[\]]*\]|Br|Cl|%\d{2}|[BCNOPSFI]|[bcnops]|\*|[=#$:/\\\-]|[().]|\d";
const BRACKET_PATTERN: &str =
    r"^\[(\d+)?([A-Z][a-z]?|[a-z][a-z]?|\*)(@@?(?:TH\d|AL\d|SP\d|TB\d{1,2}|OH\d{1,2})?)?(H\d*)?([+-]+\d*)?(:\d+)?\]$";

static TOKEN_REGEX: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
static BRACKET_REGEX: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<std::result::Result<Regex, regex::Error>>, pattern: &str) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| CoreError::InvalidConfiguration(format!("structure token pattern: {}", e)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Contribution of the bond to the valence of its atoms.
    pub fn valence(&self) -> f64 {
        match self {
            BondOrder::Single => 1.0,
            BondOrder::Double => 2.0,
            BondOrder::Triple => 3.0,
            BondOrder::Quadruple => 4.0,
            BondOrder::Aromatic => 1.5,
        }
    }

    /// Stable integer code used when hashing atom environments.
    pub fn code(&self) -> u64 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
            BondOrder::Aromatic => 5,
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "-" | "/" | "\\" => Some(BondOrder::Single),
            "=" => Some(BondOrder::Double),
            "#" => Some(BondOrder::Triple),
            "$" => Some(BondOrder::Quadruple),
            ":" => Some(BondOrder::Aromatic),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Atom {
    /// Element symbol with a leading capital, `*` for wildcard atoms.
    pub element: String,
    pub aromatic: bool,
    pub charge: i32,
    pub isotope: u16,
    /// Hydrogen count written inside brackets; `None` for organic subset atoms.
    pub bracket_hydrogens: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
}

/// Heavy atom graph of a SMILES string.
///
/// Stereo marks are read and dropped, hydrogens stay implicit.
#[derive(Clone, Debug, Default)]
pub struct MolecularGraph {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<(usize, BondOrder)>>,
    ring_bonds: Vec<bool>,
}

impl MolecularGraph {
    /// Parses a SMILES string.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smcore::data::smiles::MolecularGraph;
    /// let benzene = MolecularGraph::parse("c1ccccc1").unwrap();
    /// assert_eq!(benzene.atom_count(), 6);
    /// assert_eq!(benzene.bond_count(), 6);
    /// assert!(benzene.in_ring(0));
    /// assert_eq!(benzene.total_hydrogens(0), 1);
    /// ```
    pub fn parse(smiles: &str) -> Result<Self> {
        let tokens = tokenize(smiles)?;
        let invalid = |message: String| CoreError::InvalidStructure { structure: smiles.to_string(), message };

        let mut atoms: Vec<Atom> = Vec::new();
        let mut bonds: Vec<Bond> = Vec::new();
        let mut previous: Option<usize> = None;
        let mut branches: Vec<Option<usize>> = Vec::new();
        let mut pending: Option<BondOrder> = None;
        let mut open_rings: BTreeMap<u32, (usize, Option<BondOrder>)> = BTreeMap::new();

        for token in tokens {
            match token {
                "(" => {
                    if previous.is_none() {
                        return Err(invalid("branch opened before any atom".to_string()));
                    }
                    branches.push(previous);
                }
                ")" => {
                    previous = branches.pop().ok_or_else(|| invalid("unbalanced ')'".to_string()))?;
                    pending = None;
                }
                "." => {
                    previous = None;
                    pending = None;
                }
                t if BondOrder::from_symbol(t).is_some() => {
                    pending = BondOrder::from_symbol(t);
                }
                t if t.starts_with('%') || t.chars().all(|c| c.is_ascii_digit()) => {
                    let ring: u32 = t.trim_start_matches('%')
                        .parse()
                        .map_err(|_| invalid(format!("bad ring label '{}'", t)))?;
                    let current = previous.ok_or_else(|| invalid(format!("ring label {} before any atom", ring)))?;

                    match open_rings.remove(&ring) {
                        Some((partner, opening_order)) => {
                            if partner == current {
                                return Err(invalid(format!("ring {} closes on its own atom", ring)));
                            }
                            let order = pending.or(opening_order)
                                .unwrap_or_else(|| default_order(&atoms[partner], &atoms[current]));
                            bonds.push(Bond { a: partner, b: current, order });
                        }
                        None => {
                            open_rings.insert(ring, (current, pending));
                        }
                    }
                    pending = None;
                }
                t => {
                    let atom = parse_atom(t).ok_or_else(|| invalid(format!("unreadable atom '{}'", t)))?;
                    let index = atoms.len();
                    atoms.push(atom);
                    if let Some(p) = previous {
                        let order = pending.unwrap_or_else(|| default_order(&atoms[p], &atoms[index]));
                        bonds.push(Bond { a: p, b: index, order });
                    }
                    pending = None;
                    previous = Some(index);
                }
            }
        }

        if !branches.is_empty() {
            return Err(invalid("unbalanced '('".to_string()));
        }
        if let Some(ring) = open_rings.keys().next() {
            return Err(invalid(format!("ring {} is never closed", ring)));
        }
        if pending.is_some() {
            return Err(invalid("dangling bond at the end".to_string()));
        }

        Ok(MolecularGraph::from_parts(atoms, bonds))
    }

    fn from_parts(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for bond in &bonds {
            adjacency[bond.a].push((bond.b, bond.order));
            adjacency[bond.b].push((bond.a, bond.order));
        }
        let ring_bonds = (0..bonds.len())
            .map(|k| connected_without(&adjacency, bonds[k].a, bonds[k].b))
            .collect();
        MolecularGraph { atoms, bonds, adjacency, ring_bonds }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn neighbors(&self, atom: usize) -> &[(usize, BondOrder)] {
        &self.adjacency[atom]
    }

    /// Number of heavy atom neighbours.
    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// True when the atom has at least one bond lying on a cycle.
    pub fn in_ring(&self, atom: usize) -> bool {
        self.bonds.iter()
            .zip(self.ring_bonds.iter())
            .any(|(bond, ring)| *ring && (bond.a == atom || bond.b == atom))
    }

    /// Explicit bracket hydrogens, or implicit hydrogens from the lowest fitting default valence.
    pub fn total_hydrogens(&self, atom: usize) -> u32 {
        let a = &self.atoms[atom];
        if let Some(h) = a.bracket_hydrogens {
            return h as u32;
        }
        let bonded: f64 = self.adjacency[atom].iter().map(|(_, order)| order.valence()).sum();
        let bonded = bonded.ceil() as u32;
        default_valences(&a.element)
            .iter()
            .find(|v| **v >= bonded)
            .map(|v| v - bonded)
            .unwrap_or(0)
    }
}

fn tokenize(smiles: &str) -> Result<Vec<&str>> {
    let pattern = compiled(&TOKEN_REGEX, TOKEN_PATTERN)?;
    let mut tokens = Vec::new();
    let mut position = 0;

    for m in pattern.find_iter(smiles) {
        if m.start() != position {
            return Err(CoreError::InvalidStructure {
                structure: smiles.to_string(),
                message: format!("unexpected character at position {}", position),
            });
        }
        tokens.push(m.as_str());
        position = m.end();
    }
    if position != smiles.len() {
        return Err(CoreError::InvalidStructure {
            structure: smiles.to_string(),
            message: format!("unexpected character at position {}", position),
        });
    }
    Ok(tokens)
}

fn parse_atom(token: &str) -> Option<Atom> {
    if token.starts_with('[') {
        return parse_bracket_atom(token);
    }
    let aromatic = token.chars().next()?.is_ascii_lowercase();
    Some(Atom {
        element: capitalize(token),
        aromatic,
        charge: 0,
        isotope: 0,
        bracket_hydrogens: None,
    })
}

fn parse_bracket_atom(token: &str) -> Option<Atom> {
    let pattern = compiled(&BRACKET_REGEX, BRACKET_PATTERN).ok()?;
    let caps = pattern.captures(token)?;

    let isotope = match caps.get(1) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let symbol = caps.get(2)?.as_str();
    let hydrogens = match caps.get(4) {
        Some(m) if m.as_str().len() > 1 => m.as_str()[1..].parse().ok()?,
        Some(_) => 1,
        None => 0,
    };
    let charge = match caps.get(5) {
        Some(m) => parse_charge(m.as_str())?,
        None => 0,
    };

    Some(Atom {
        element: capitalize(symbol),
        aromatic: symbol.chars().next()?.is_ascii_lowercase(),
        charge,
        isotope,
        bracket_hydrogens: Some(hydrogens),
    })
}

fn parse_charge(text: &str) -> Option<i32> {
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let digits = text.trim_start_matches(['+', '-']);
    if digits.is_empty() {
        Some(sign * text.len() as i32)
    } else {
        digits.parse::<i32>().ok().map(|d| sign * d)
    }
}

fn capitalize(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn default_order(a: &Atom, b: &Atom) -> BondOrder {
    if a.aromatic && b.aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

fn default_valences(element: &str) -> &'static [u32] {
    match element {
        "B" => &[3],
        "C" => &[4],
        "N" => &[3, 5],
        "O" => &[2],
        "P" => &[3, 5],
        "S" => &[2, 4, 6],
        "F" | "Cl" | "Br" | "I" => &[1],
        _ => &[],
    }
}

/// Breadth-first search from `from` to `to` that may not use the direct bond between them.
fn connected_without(adjacency: &[Vec<(usize, BondOrder)>], from: usize, to: usize) -> bool {
    let mut seen = vec![false; adjacency.len()];
    let mut queue = VecDeque::from([from]);
    seen[from] = true;
    let mut skipped_direct = false;

    while let Some(current) = queue.pop_front() {
        for (next, _) in &adjacency[current] {
            if current == from && *next == to && !skipped_direct {
                skipped_direct = true;
                continue;
            }
            if *next == to {
                return true;
            }
            if !seen[*next] {
                seen[*next] = true;
                queue.push_back(*next);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_and_branch() {
        let graph = MolecularGraph::parse("CC(=O)O").unwrap();
        assert_eq!(graph.atom_count(), 4);
        assert_eq!(graph.bonds()[1], Bond { a: 1, b: 2, order: BondOrder::Double });
        assert_eq!(graph.bonds()[2], Bond { a: 1, b: 3, order: BondOrder::Single });
        assert_eq!(graph.total_hydrogens(0), 3);
        assert_eq!(graph.total_hydrogens(1), 0);
        assert_eq!(graph.total_hydrogens(3), 1);
        assert!(!graph.in_ring(1));
    }

    #[test]
    fn test_bracket_atoms() {
        let graph = MolecularGraph::parse("[NH4+].[O-]C(=O)[13CH3]").unwrap();
        let atoms = graph.atoms();
        assert_eq!(atoms[0].element, "N");
        assert_eq!(atoms[0].charge, 1);
        assert_eq!(graph.total_hydrogens(0), 4);
        assert_eq!(atoms[1].charge, -1);
        assert_eq!(atoms[4].isotope, 13);
        assert_eq!(graph.total_hydrogens(4), 3);
        assert_eq!(graph.degree(0), 0);
    }

    #[test]
    fn test_ring_closures() {
        let graph = MolecularGraph::parse("C1CC%10CC1CC%10").unwrap();
        assert_eq!(graph.bond_count(), 8);
        assert!(graph.in_ring(0));
        assert!(graph.in_ring(6));
    }

    #[test]
    fn test_two_letter_and_aromatic() {
        let graph = MolecularGraph::parse("Clc1ccncc1Br").unwrap();
        assert_eq!(graph.atoms()[0].element, "Cl");
        assert!(graph.atoms()[4].aromatic);
        assert_eq!(graph.atoms()[4].element, "N");
        assert_eq!(graph.total_hydrogens(4), 0);
        assert_eq!(graph.total_hydrogens(2), 1);
        assert!(!graph.in_ring(0));
    }

    #[test]
    fn test_malformed() {
        for smiles in ["C1CC", "C(C", "CC)", "C=", "(C)", "C&C", "[Xx"] {
            assert!(
                matches!(MolecularGraph::parse(smiles), Err(CoreError::InvalidStructure { .. })),
                "{} should be rejected",
                smiles
            );
        }
    }

    #[test]
    fn test_empty() {
        let graph = MolecularGraph::parse("").unwrap();
        assert_eq!(graph.atom_count(), 0);
    }
}
