//! The recursive structural DIE comparator: decides whether two DIEs
//! of one source denote the same IR entity, cutting cycles through a
//! set of in-flight pretty names and propagating canonical offsets
//! between DIEs it proves equal.

use constants;
use canon::CanonCache;
use die::{DebugInfo, DieId};
use dwarf::{Dwarf, GlobalDie};
use endianity::Endianity;
use names;

/// How deep member-type comparisons may recurse before falling back
/// to a shallow name-and-size check.
const MAX_TYPE_DEPTH: usize = 5;

/// The set of aggregate pretty names currently being compared, used
/// to cut cycles and to bound member-type recursion.
#[derive(Debug, Default)]
pub struct BeingCompared {
    names: Vec<String>,
}

impl BeingCompared {
    /// An empty set.
    pub fn new() -> BeingCompared {
        BeingCompared::default()
    }

    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn push(&mut self, name: String) {
        self.names.push(name);
    }

    fn pop(&mut self, count: usize) {
        let new_len = self.names.len() - count;
        self.names.truncate(new_len);
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

/// Compare two DIEs of the cache's source structurally.
///
/// When `update_canonical` is set and the comparison succeeds, the
/// canonical offset of one side is propagated to the other.
pub fn compare_dies<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                    cache: &mut CanonCache,
                                    l: DieId,
                                    r: DieId,
                                    being_compared: &mut BeingCompared,
                                    update_canonical: bool)
                                    -> bool
    where Endian: Endianity
{
    let source = cache.source();
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return false,
    };

    let l_tag = info.die(l).tag();
    let r_tag = info.die(r).tag();
    if l_tag != r_tag {
        return false;
    }
    if l == r {
        return true;
    }

    // Both sides already placed: their canonical offsets decide.
    let l_off = info.die(l).offset();
    let r_off = info.die(r).offset();
    if let (Some(lc), Some(rc)) = (cache.canonical_offset(l_off),
                                   cache.canonical_offset(r_off)) {
        return lc == rc;
    }

    // Declarations must agree on (linkage) names before anything
    // else. Formal parameters are exempt: their names vary freely
    // across otherwise identical signatures.
    let is_decl = match l_tag {
        constants::DW_TAG_variable |
        constants::DW_TAG_member |
        constants::DW_TAG_namespace |
        constants::DW_TAG_subprogram => true,
        _ => false,
    };
    if is_decl {
        if !linkage_names_equal(info, l, r) {
            return false;
        }
        if !info.string_attrs_equal(l, info, r, constants::DW_AT_name) {
            return false;
        }
    }

    let equal = compare_by_tag(dwarf, cache, l, r, being_compared, update_canonical);

    if equal && update_canonical &&
       (l_tag.is_type_tag() || l_tag == constants::DW_TAG_subroutine_type) {
        propagate_canonical(dwarf, cache, l, r);
    }
    equal
}

fn linkage_names_equal<'input, Endian>(info: &DebugInfo<'input, Endian>,
                                       l: DieId,
                                       r: DieId)
                                       -> bool
    where Endian: Endianity
{
    info.string_attrs_equal(l, info, r, constants::DW_AT_linkage_name) &&
    info.string_attrs_equal(l, info, r, constants::DW_AT_MIPS_linkage_name)
}

fn compare_by_tag<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                  cache: &mut CanonCache,
                                  l: DieId,
                                  r: DieId,
                                  being_compared: &mut BeingCompared,
                                  update_canonical: bool)
                                  -> bool
    where Endian: Endianity
{
    let source = cache.source();
    let info = dwarf.info(source).expect("source already checked");
    let tag = info.die(l).tag();

    match tag {
        constants::DW_TAG_base_type |
        constants::DW_TAG_string_type => {
            info.size_in_bits(l) == info.size_in_bits(r) &&
            base_names_equal(info, l, r)
        }

        constants::DW_TAG_typedef |
        constants::DW_TAG_pointer_type |
        constants::DW_TAG_reference_type |
        constants::DW_TAG_rvalue_reference_type |
        constants::DW_TAG_const_type |
        constants::DW_TAG_volatile_type |
        constants::DW_TAG_restrict_type => {
            if tag == constants::DW_TAG_typedef &&
               !info.string_attrs_equal(l, info, r, constants::DW_AT_name) {
                return false;
            }
            // Same-CU-file short-circuit. This trusts that one source
            // file produces one set of types, which does not hold for
            // CUs sharing a path with different contents; it is kept
            // for compatibility with existing corpora.
            if !points_to_anonymous_class(dwarf, (source, l)) &&
               same_cu_file(info, l, r) {
                return true;
            }
            let l_under = dwarf.die_type_reference((source, l), constants::DW_AT_type);
            let r_under = dwarf.die_type_reference((source, r), constants::DW_AT_type);
            compare_type_refs(dwarf,
                              cache,
                              l_under,
                              r_under,
                              being_compared,
                              update_canonical)
        }

        constants::DW_TAG_enumeration_type => {
            if !info.string_attrs_equal(l, info, r, constants::DW_AT_name) {
                return false;
            }
            if info.size_in_bits(l) != info.size_in_bits(r) {
                return false;
            }
            let l_enums = enumerators(info, l);
            let r_enums = enumerators(info, r);
            l_enums == r_enums
        }

        constants::DW_TAG_class_type |
        constants::DW_TAG_structure_type |
        constants::DW_TAG_union_type => {
            compare_classes(dwarf, cache, l, r, being_compared, update_canonical)
        }

        constants::DW_TAG_array_type => {
            let l_subs = children_with_tag(info, l, constants::DW_TAG_subrange_type);
            let r_subs = children_with_tag(info, r, constants::DW_TAG_subrange_type);
            if l_subs.len() != r_subs.len() {
                return false;
            }
            for (&ls, &rs) in l_subs.iter().zip(r_subs.iter()) {
                if !compare_dies(dwarf, cache, ls, rs, being_compared, update_canonical) {
                    return false;
                }
            }
            let l_elem = dwarf.die_type_reference((source, l), constants::DW_AT_type);
            let r_elem = dwarf.die_type_reference((source, r), constants::DW_AT_type);
            compare_type_refs(dwarf,
                              cache,
                              l_elem,
                              r_elem,
                              being_compared,
                              update_canonical)
        }

        constants::DW_TAG_subrange_type => {
            subrange_bounds(info, l) == subrange_bounds(info, r)
        }

        constants::DW_TAG_subroutine_type |
        constants::DW_TAG_subprogram => {
            compare_function_dies(dwarf, cache, l, r, being_compared, update_canonical)
        }

        constants::DW_TAG_formal_parameter => {
            let l_type = dwarf.die_type_reference((source, l), constants::DW_AT_type);
            let r_type = dwarf.die_type_reference((source, r), constants::DW_AT_type);
            compare_type_refs(dwarf,
                              cache,
                              l_type,
                              r_type,
                              being_compared,
                              update_canonical)
        }

        constants::DW_TAG_variable |
        constants::DW_TAG_member => {
            compare_members(dwarf, cache, l, r, being_compared, update_canonical)
        }

        // For tags outside the structural rules the deterministic
        // names decide.
        _ => {
            names::die_pretty_name(dwarf, (source, l)) ==
            names::die_pretty_name(dwarf, (source, r))
        }
    }
}

fn base_names_equal<'input, Endian>(info: &DebugInfo<'input, Endian>,
                                    l: DieId,
                                    r: DieId)
                                    -> bool
    where Endian: Endianity
{
    if info.string_attrs_equal(l, info, r, constants::DW_AT_name) {
        return true;
    }
    match (info.name(l), info.name(r)) {
        (Some(ln), Some(rn)) => {
            names::normalize_integral_name(ln) == names::normalize_integral_name(rn)
        }
        (None, None) => true,
        _ => false,
    }
}

fn same_cu_file<'input, Endian>(info: &DebugInfo<'input, Endian>,
                                l: DieId,
                                r: DieId)
                                -> bool
    where Endian: Endianity
{
    let l_root = info.unit_of(l).root();
    let r_root = info.unit_of(r).root();
    match (info.name(l_root), info.name(r_root)) {
        (Some(ln), Some(rn)) => ln == rn,
        _ => false,
    }
}

fn points_to_anonymous_class<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                             die: GlobalDie)
                                             -> bool
    where Endian: Endianity
{
    let target = match dwarf.die_type_reference(die, constants::DW_AT_type) {
        Some(target) => target,
        None => return false,
    };
    let (source, id) = target;
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return false,
    };
    let tag = info.die(id).tag();
    (tag.is_class_or_union_tag() || tag == constants::DW_TAG_enumeration_type) &&
    info.name(id).is_none()
}

fn compare_type_refs<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                     cache: &mut CanonCache,
                                     l: Option<GlobalDie>,
                                     r: Option<GlobalDie>,
                                     being_compared: &mut BeingCompared,
                                     update_canonical: bool)
                                     -> bool
    where Endian: Endianity
{
    match (l, r) {
        // Void on both sides.
        (None, None) => true,
        (Some((l_source, l_id)), Some((r_source, r_id))) => {
            if l_source != r_source {
                // Cross-source references cannot share a cache; their
                // deterministic names decide.
                return names::die_pretty_name(dwarf, (l_source, l_id)) ==
                       names::die_pretty_name(dwarf, (r_source, r_id));
            }
            if l_source != cache.source() {
                return names::die_pretty_name(dwarf, (l_source, l_id)) ==
                       names::die_pretty_name(dwarf, (r_source, r_id));
            }
            compare_dies(dwarf, cache, l_id, r_id, being_compared, update_canonical)
        }
        _ => false,
    }
}

fn enumerators<'input, Endian>(info: &DebugInfo<'input, Endian>,
                               id: DieId)
                               -> Vec<(Option<&'input str>, i64)>
    where Endian: Endianity
{
    info.children(id)
        .iter()
        .filter(|&&child| info.die(child).tag() == constants::DW_TAG_enumerator)
        .map(|&child| {
            (info.name(child),
             info.signed_constant(child, constants::DW_AT_const_value).unwrap_or(0))
        })
        .collect()
}

fn children_with_tag<'input, Endian>(info: &DebugInfo<'input, Endian>,
                                     id: DieId,
                                     tag: constants::DwTag)
                                     -> Vec<DieId>
    where Endian: Endianity
{
    info.children(id)
        .iter()
        .cloned()
        .filter(|&child| info.die(child).tag() == tag)
        .collect()
}

fn subrange_bounds<'input, Endian>(info: &DebugInfo<'input, Endian>,
                                   id: DieId)
                                   -> (u64, Option<u64>)
    where Endian: Endianity
{
    let lower = info.unsigned_constant(id, constants::DW_AT_lower_bound)
        .unwrap_or_else(|| info.unit_of(id).language().default_lower_bound());
    let upper = match info.unsigned_constant(id, constants::DW_AT_upper_bound) {
        Some(upper) if upper != ::std::u64::MAX => Some(upper),
        Some(_) => None,
        None => {
            match info.unsigned_constant(id, constants::DW_AT_count) {
                Some(0) | None => None,
                Some(count) => Some(lower + count - 1),
            }
        }
    };
    (lower, upper)
}

fn compare_classes<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                   cache: &mut CanonCache,
                                   l: DieId,
                                   r: DieId,
                                   being_compared: &mut BeingCompared,
                                   update_canonical: bool)
                                   -> bool
    where Endian: Endianity
{
    let source = cache.source();
    let info = dwarf.info(source).expect("source already checked");

    let l_key = cache.pretty_name(dwarf, l);
    let r_key = cache.pretty_name(dwarf, r);
    if l_key != r_key {
        return false;
    }
    // Cycle cut: an aggregate being compared further up the stack is
    // assumed equal here; the outer comparison decides.
    if being_compared.contains(&l_key) || being_compared.contains(&r_key) {
        return true;
    }

    // A forward declaration matches anything its name matches.
    let l_decl_only = info.flag(l, constants::DW_AT_declaration);
    let r_decl_only = info.flag(r, constants::DW_AT_declaration);
    if l_decl_only || r_decl_only {
        return true;
    }

    if info.size_in_bits(l) != info.size_in_bits(r) {
        return false;
    }

    being_compared.push(l_key);
    let pushed = 1;

    let result = (|| {
        let l_bases = children_with_tag(info, l, constants::DW_TAG_inheritance);
        let r_bases = children_with_tag(info, r, constants::DW_TAG_inheritance);
        if l_bases.len() != r_bases.len() {
            return false;
        }
        for (&lb, &rb) in l_bases.iter().zip(r_bases.iter()) {
            if member_offset(info, lb) != member_offset(info, rb) {
                return false;
            }
            let l_base = dwarf.die_type_reference((source, lb), constants::DW_AT_type);
            let r_base = dwarf.die_type_reference((source, rb), constants::DW_AT_type);
            if !compare_type_refs(dwarf,
                                  cache,
                                  l_base,
                                  r_base,
                                  being_compared,
                                  update_canonical) {
                return false;
            }
        }

        let l_members = children_with_tag(info, l, constants::DW_TAG_member);
        let r_members = children_with_tag(info, r, constants::DW_TAG_member);
        if l_members.len() != r_members.len() {
            return false;
        }
        for (&lm, &rm) in l_members.iter().zip(r_members.iter()) {
            if !compare_dies(dwarf, cache, lm, rm, being_compared, update_canonical) {
                return false;
            }
        }
        true
    })();

    being_compared.pop(pushed);
    result
}

fn member_offset<'input, Endian>(info: &DebugInfo<'input, Endian>,
                                 id: DieId)
                                 -> Option<u64>
    where Endian: Endianity
{
    if let Some(offset) =
        info.unsigned_constant(id, constants::DW_AT_data_member_location) {
        return Some(offset * 8);
    }
    if let Some(expr) = info.expression(id, constants::DW_AT_data_member_location) {
        let buf = ::endianity::EndianBuf::<Endian>::new(expr);
        return ::expr::member_offset_in_bits(buf, info.unit_of(id).address_size());
    }
    None
}

fn compare_members<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                   cache: &mut CanonCache,
                                   l: DieId,
                                   r: DieId,
                                   being_compared: &mut BeingCompared,
                                   update_canonical: bool)
                                   -> bool
    where Endian: Endianity
{
    let source = cache.source();
    let info = dwarf.info(source).expect("source already checked");

    if info.die(l).tag() == constants::DW_TAG_member &&
       member_offset(info, l) != member_offset(info, r) {
        return false;
    }
    if info.unsigned_constant(l, constants::DW_AT_accessibility) !=
       info.unsigned_constant(r, constants::DW_AT_accessibility) {
        return false;
    }

    let l_type = dwarf.die_type_reference((source, l), constants::DW_AT_type);
    let r_type = dwarf.die_type_reference((source, r), constants::DW_AT_type);

    // Deep in an aggregate comparison the member types get a shallow
    // name-and-size check, bounding the recursion.
    if being_compared.len() >= MAX_TYPE_DEPTH {
        return match (l_type, r_type) {
            (None, None) => true,
            (Some(lt), Some(rt)) => {
                let (ls, lid) = lt;
                let (rs, rid) = rt;
                let l_size = dwarf.info(ls).and_then(|i| i.size_in_bits(lid));
                let r_size = dwarf.info(rs).and_then(|i| i.size_in_bits(rid));
                l_size == r_size &&
                names::die_pretty_name(dwarf, lt) == names::die_pretty_name(dwarf, rt)
            }
            _ => false,
        };
    }

    compare_type_refs(dwarf, cache, l_type, r_type, being_compared, update_canonical)
}

fn compare_function_dies<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                         cache: &mut CanonCache,
                                         l: DieId,
                                         r: DieId,
                                         being_compared: &mut BeingCompared,
                                         update_canonical: bool)
                                         -> bool
    where Endian: Endianity
{
    let source = cache.source();
    let info = dwarf.info(source).expect("source already checked");

    let l_key = cache.pretty_name(dwarf, l);
    let r_key = cache.pretty_name(dwarf, r);
    if l_key != r_key {
        return false;
    }
    if being_compared.contains(&l_key) || being_compared.contains(&r_key) {
        return true;
    }

    being_compared.push(l_key);

    let result = (|| {
        let l_ret = dwarf.die_type_reference((source, l), constants::DW_AT_type);
        let r_ret = dwarf.die_type_reference((source, r), constants::DW_AT_type);
        if !compare_type_refs(dwarf,
                              cache,
                              l_ret,
                              r_ret,
                              being_compared,
                              update_canonical) {
            return false;
        }

        let l_params = children_with_tag(info, l, constants::DW_TAG_formal_parameter);
        let r_params = children_with_tag(info, r, constants::DW_TAG_formal_parameter);
        if l_params.len() != r_params.len() {
            return false;
        }
        for (&lp, &rp) in l_params.iter().zip(r_params.iter()) {
            if !compare_dies(dwarf, cache, lp, rp, being_compared, update_canonical) {
                return false;
            }
        }
        true
    })();

    being_compared.pop(1);
    result
}

/// Propagate canonical offsets between two DIEs proven equal: the
/// side that already has a representative lends it to the other; when
/// neither has one, the right side becomes canonical first.
fn propagate_canonical<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                       cache: &mut CanonCache,
                                       l: DieId,
                                       r: DieId)
    where Endian: Endianity
{
    let source = cache.source();
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return,
    };
    let l_off = info.die(l).offset();
    let r_off = info.die(r).offset();

    match (cache.canonical_offset(l_off), cache.canonical_offset(r_off)) {
        (None, Some(rc)) => cache.set_canonical(l_off, rc),
        (Some(lc), None) => cache.set_canonical(r_off, lc),
        (None, None) => {
            let key = cache.pretty_name(dwarf, r);
            cache.register(&key, r_off);
            cache.set_canonical(r_off, r_off);
            cache.set_canonical(l_off, r_off);
        }
        (Some(_), Some(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon::CanonCache;
    use constants::*;
    use die::DieSource;
    use dwarf::{Dwarf, DwarfSections};
    use endianity::{EndianBuf, LittleEndian};
    use test_util::{TestAttr, TestDie, TestDwarf};

    fn dwarf_from(test: &TestDwarf) -> Dwarf<LittleEndian> {
        Dwarf::parse(DwarfSections::new(EndianBuf::new(test.debug_info()),
                                        EndianBuf::new(test.debug_abbrev()),
                                        EndianBuf::new(test.debug_str())),
                     None)
            .expect("should parse")
    }

    fn struct_s(labels: (&'static str, &'static str)) -> TestDie {
        TestDie::new(DW_TAG_compile_unit)
            .attr(DW_AT_name, TestAttr::Str("a.c"))
            .child(TestDie::new(DW_TAG_base_type)
                .label(labels.0)
                .attr(DW_AT_name, TestAttr::Str("int"))
                .attr(DW_AT_byte_size, TestAttr::Data1(4)))
            .child(TestDie::new(DW_TAG_structure_type)
                .label(labels.1)
                .attr(DW_AT_name, TestAttr::Str("S"))
                .attr(DW_AT_byte_size, TestAttr::Data1(8))
                .child(TestDie::new(DW_TAG_member)
                    .attr(DW_AT_name, TestAttr::Str("a"))
                    .attr(DW_AT_type, TestAttr::Ref(labels.0))
                    .attr(DW_AT_data_member_location, TestAttr::Data1(0)))
                .child(TestDie::new(DW_TAG_member)
                    .attr(DW_AT_name, TestAttr::Str("b"))
                    .attr(DW_AT_type, TestAttr::Ref(labels.0))
                    .attr(DW_AT_data_member_location, TestAttr::Data1(4))))
    }

    fn find_structs(dwarf: &Dwarf<LittleEndian>) -> Vec<::die::DieId> {
        let info = dwarf.primary();
        let mut out = Vec::new();
        for unit in info.units() {
            for &child in info.children(unit.root()) {
                if info.die(child).tag() == DW_TAG_structure_type {
                    out.push(child);
                }
            }
        }
        out
    }

    #[test]
    fn test_equal_structs_across_units() {
        let mut test = TestDwarf::new();
        // The same struct S in two units; the C language avoids the
        // ODR trust so the comparison actually runs.
        test.compile_unit(DW_LANG_C99, struct_s(("int_a", "s_a")));
        test.compile_unit(DW_LANG_C99, struct_s(("int_b", "s_b")));
        let test = test.build();
        let dwarf = dwarf_from(&test);

        let structs = find_structs(&dwarf);
        assert_eq!(structs.len(), 2);
        let mut cache = CanonCache::new(DieSource::Primary);
        let mut being = BeingCompared::new();
        assert!(compare_dies(&dwarf,
                             &mut cache,
                             structs[0],
                             structs[1],
                             &mut being,
                             false));
    }

    #[test]
    fn test_different_member_offset_is_unequal() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, struct_s(("int_a", "s_a")));
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("b.c"))
                              .child(TestDie::new(DW_TAG_base_type)
                                  .label("int_b")
                                  .attr(DW_AT_name, TestAttr::Str("int"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(4)))
                              .child(TestDie::new(DW_TAG_structure_type)
                                  .attr(DW_AT_name, TestAttr::Str("S"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(8))
                                  .child(TestDie::new(DW_TAG_member)
                                      .attr(DW_AT_name, TestAttr::Str("a"))
                                      .attr(DW_AT_type, TestAttr::Ref("int_b"))
                                      .attr(DW_AT_data_member_location,
                                            TestAttr::Data1(4)))
                                  .child(TestDie::new(DW_TAG_member)
                                      .attr(DW_AT_name, TestAttr::Str("b"))
                                      .attr(DW_AT_type, TestAttr::Ref("int_b"))
                                      .attr(DW_AT_data_member_location,
                                            TestAttr::Data1(0)))));
        let test = test.build();
        let dwarf = dwarf_from(&test);

        let structs = find_structs(&dwarf);
        let mut cache = CanonCache::new(DieSource::Primary);
        let mut being = BeingCompared::new();
        assert!(!compare_dies(&dwarf,
                              &mut cache,
                              structs[0],
                              structs[1],
                              &mut being,
                              false));
    }

    fn node_cu(file: &'static str,
               int_label: &'static str,
               node_label: &'static str,
               ptr_label: &'static str)
               -> TestDie {
        TestDie::new(DW_TAG_compile_unit)
            .attr(DW_AT_name, TestAttr::Str(file))
            .child(TestDie::new(DW_TAG_structure_type)
                .label(node_label)
                .attr(DW_AT_name, TestAttr::Str("Node"))
                .attr(DW_AT_byte_size, TestAttr::Data1(8))
                .child(TestDie::new(DW_TAG_member)
                    .attr(DW_AT_name, TestAttr::Str("next"))
                    .attr(DW_AT_type, TestAttr::Ref(ptr_label))
                    .attr(DW_AT_data_member_location, TestAttr::Data1(0))))
            .child(TestDie::new(DW_TAG_pointer_type)
                .label(ptr_label)
                .attr(DW_AT_type, TestAttr::Ref(node_label)))
            .child(TestDie::new(DW_TAG_base_type)
                .label(int_label)
                .attr(DW_AT_name, TestAttr::Str("int")))
    }

    #[test]
    fn test_cyclic_struct_comparison_terminates() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, node_cu("a.c", "i1", "n1", "p1"));
        test.compile_unit(DW_LANG_C99, node_cu("b.c", "i2", "n2", "p2"));
        let test = test.build();
        let dwarf = dwarf_from(&test);

        let structs = find_structs(&dwarf);
        assert_eq!(structs.len(), 2);
        let mut cache = CanonCache::new(DieSource::Primary);
        let mut being = BeingCompared::new();
        assert!(compare_dies(&dwarf,
                             &mut cache,
                             structs[0],
                             structs[1],
                             &mut being,
                             false));
        assert_eq!(being.len(), 0);
    }

    #[test]
    fn test_declaration_matches_definition() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, struct_s(("int_a", "s_a")));
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("b.c"))
                              .child(TestDie::new(DW_TAG_structure_type)
                                  .attr(DW_AT_name, TestAttr::Str("S"))
                                  .attr(DW_AT_declaration, TestAttr::Flag(true))));
        let test = test.build();
        let dwarf = dwarf_from(&test);

        let structs = find_structs(&dwarf);
        let mut cache = CanonCache::new(DieSource::Primary);
        let mut being = BeingCompared::new();
        assert!(compare_dies(&dwarf,
                             &mut cache,
                             structs[0],
                             structs[1],
                             &mut being,
                             false));
    }

    #[test]
    fn test_canonical_propagation() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, struct_s(("int_a", "s_a")));
        test.compile_unit(DW_LANG_C99, struct_s(("int_b", "s_b")));
        let test = test.build();
        let dwarf = dwarf_from(&test);

        let structs = find_structs(&dwarf);
        let info = dwarf.primary();
        let l_off = info.die(structs[0]).offset();
        let r_off = info.die(structs[1]).offset();

        let mut cache = CanonCache::new(DieSource::Primary);
        let mut being = BeingCompared::new();
        assert!(compare_dies(&dwarf,
                             &mut cache,
                             structs[0],
                             structs[1],
                             &mut being,
                             true));
        // Propagation: the right side became canonical to itself and
        // lent its offset to the left.
        assert_eq!(cache.canonical_offset(r_off), Some(r_off));
        assert_eq!(cache.canonical_offset(l_off), Some(r_off));
    }

    #[test]
    fn test_enum_comparison() {
        fn enum_cu(file: &'static str, flip: bool) -> TestDie {
            let (a, b) = if flip { (1, 0) } else { (0, 1) };
            TestDie::new(DW_TAG_compile_unit)
                .attr(DW_AT_name, TestAttr::Str(file))
                .child(TestDie::new(DW_TAG_enumeration_type)
                    .attr(DW_AT_name, TestAttr::Str("E"))
                    .attr(DW_AT_byte_size, TestAttr::Data1(4))
                    .child(TestDie::new(DW_TAG_enumerator)
                        .attr(DW_AT_name, TestAttr::Str("A"))
                        .attr(DW_AT_const_value, TestAttr::Sdata(a)))
                    .child(TestDie::new(DW_TAG_enumerator)
                        .attr(DW_AT_name, TestAttr::Str("B"))
                        .attr(DW_AT_const_value, TestAttr::Sdata(b))))
        }

        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, enum_cu("a.c", false));
        test.compile_unit(DW_LANG_C99, enum_cu("b.c", false));
        test.compile_unit(DW_LANG_C99, enum_cu("c.c", true));
        let test = test.build();
        let dwarf = dwarf_from(&test);

        let info = dwarf.primary();
        let enums: Vec<_> = info.units()
            .iter()
            .map(|unit| info.children(unit.root())[0])
            .collect();

        let mut cache = CanonCache::new(DieSource::Primary);
        let mut being = BeingCompared::new();
        assert!(compare_dies(&dwarf, &mut cache, enums[0], enums[1], &mut being, false));
        assert!(!compare_dies(&dwarf, &mut cache, enums[0], enums[2], &mut being, false));
    }
}
