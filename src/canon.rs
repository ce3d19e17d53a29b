//! The per-source canonicalization cache: pretty-name-keyed lists of
//! DIE offsets whose first entry is the canonical representative, the
//! offset-to-canonical fast path, and the memoized pretty names.
//!
//! This cache is what turns the potentially exponential structural
//! comparison space into amortised near-linear work: a DIE is only
//! ever compared against the few DIEs sharing its pretty name.

use std::collections::HashMap;

use compare::{BeingCompared, compare_dies};
use die::{DieId, DieOffset, DieSource};
use dwarf::Dwarf;
use endianity::Endianity;
use names;

/// The outcome of a canonicalization lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonOutcome {
    /// The DIE's offset was already placed.
    AlreadyCanonical(DieOffset),
    /// The DIE matched an existing representative.
    Matched(DieOffset),
    /// The DIE became the representative of a new, or its own,
    /// equivalence class.
    NewlyCanonical(DieOffset),
}

impl CanonOutcome {
    /// The canonical offset, whichever way it was reached.
    pub fn offset(&self) -> DieOffset {
        match *self {
            CanonOutcome::AlreadyCanonical(offset) |
            CanonOutcome::Matched(offset) |
            CanonOutcome::NewlyCanonical(offset) => offset,
        }
    }
}

/// Running totals for the stats option.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonStats {
    /// Lookups answered from the offset map.
    pub hits: usize,
    /// Structural comparisons actually run.
    pub comparisons: usize,
    /// DIEs that became their own representative.
    pub newly_canonical: usize,
    /// Lookups resolved by the One-Definition-Rule trust.
    pub odr_trusted: usize,
}

/// The canonicalization state of one DIE source.
#[derive(Debug)]
pub struct CanonCache {
    source: DieSource,
    key_to_offsets: HashMap<String, Vec<DieOffset>>,
    canonical: HashMap<DieOffset, DieOffset>,
    pretty_names: HashMap<DieOffset, String>,
    stats: CanonStats,
}

impl CanonCache {
    /// A new cache for the given source.
    pub fn new(source: DieSource) -> CanonCache {
        CanonCache {
            source: source,
            key_to_offsets: HashMap::new(),
            canonical: HashMap::new(),
            pretty_names: HashMap::new(),
            stats: CanonStats::default(),
        }
    }

    /// The source this cache serves. Representatives are only ever
    /// chosen within it.
    pub fn source(&self) -> DieSource {
        self.source
    }

    /// The canonical offset of a DIE, when it has been placed.
    pub fn canonical_offset(&self, offset: DieOffset) -> Option<DieOffset> {
        self.canonical.get(&offset).cloned()
    }

    /// Record a DIE's canonical offset. Idempotent: the first record
    /// wins, later ones are ignored.
    pub fn set_canonical(&mut self, offset: DieOffset, canon: DieOffset) {
        self.canonical.entry(offset).or_insert(canon);
    }

    /// Register an offset under a key, once.
    pub fn register(&mut self, key: &str, offset: DieOffset) {
        let list = self.key_to_offsets
            .entry(key.to_string())
            .or_insert_with(Vec::new);
        if !list.contains(&offset) {
            list.push(offset);
        }
    }

    /// The memoized pretty name of a DIE.
    pub fn pretty_name<'input, Endian>(&mut self,
                                       dwarf: &Dwarf<'input, Endian>,
                                       id: DieId)
                                       -> String
        where Endian: Endianity
    {
        let offset = match dwarf.info(self.source) {
            Some(info) => info.die(id).offset(),
            None => return String::new(),
        };
        if let Some(name) = self.pretty_names.get(&offset) {
            return name.clone();
        }
        let name = names::die_pretty_name(dwarf, (self.source, id));
        self.pretty_names.insert(offset, name.clone());
        name
    }

    /// The totals so far.
    pub fn stats(&self) -> CanonStats {
        self.stats
    }

    /// Find or choose the canonical representative of a DIE.
    ///
    /// The candidate list of the DIE's key may grow while it is being
    /// walked (comparisons canonicalize sub-DIEs sharing the key), so
    /// iteration is by index against a freshly read length.
    pub fn lookup_or_canonicalize<'input, Endian>(&mut self,
                                                  dwarf: &Dwarf<'input, Endian>,
                                                  id: DieId)
                                                  -> CanonOutcome
        where Endian: Endianity
    {
        let info = match dwarf.info(self.source) {
            Some(info) => info,
            None => return CanonOutcome::NewlyCanonical(DieOffset(0)),
        };
        let offset = info.die(id).offset();

        if let Some(canon) = self.canonical_offset(offset) {
            self.stats.hits += 1;
            return CanonOutcome::AlreadyCanonical(canon);
        }

        let key = self.pretty_name(dwarf, id);

        if self.key_to_offsets.get(&key).map(|l| l.is_empty()).unwrap_or(true) {
            self.register(&key, offset);
            self.set_canonical(offset, offset);
            self.stats.newly_canonical += 1;
            return CanonOutcome::NewlyCanonical(offset);
        }

        // Languages with a One-Definition Rule guarantee that one
        // name denotes one type, so the first entry is trusted
        // outright.
        if info.unit_of(id).language().has_odr() {
            let first = self.key_to_offsets[&key][0];
            self.set_canonical(offset, first);
            self.stats.odr_trusted += 1;
            return CanonOutcome::Matched(first);
        }

        let mut index = 0;
        loop {
            let candidate = {
                let list = match self.key_to_offsets.get(&key) {
                    Some(list) => list,
                    None => break,
                };
                if index >= list.len() {
                    break;
                }
                list[index]
            };
            index += 1;

            if candidate == offset {
                continue;
            }
            let candidate_id = match info.die_at_offset(candidate) {
                Some(candidate_id) => candidate_id,
                None => continue,
            };

            self.stats.comparisons += 1;
            let mut being_compared = BeingCompared::new();
            if compare_dies(dwarf, self, id, candidate_id, &mut being_compared, true) {
                // The comparator's propagation has already placed the
                // offset (or the pair) in the canonical map.
                let canon = self.canonical_offset(offset).unwrap_or(candidate);
                self.set_canonical(offset, canon);
                return CanonOutcome::Matched(canon);
            }
        }

        self.register(&key, offset);
        self.set_canonical(offset, offset);
        self.stats.newly_canonical += 1;
        CanonOutcome::NewlyCanonical(offset)
    }
}
