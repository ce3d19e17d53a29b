//! Deterministic "pretty" and "qualified" names for DIEs.
//!
//! These strings are the keys of the canonicalization cache, so the
//! printers must be stable across runs and collapse spelling variants
//! (integral names, cv ordering) that do not change the type.

use constants;
use dwarf::{Dwarf, GlobalDie};
use endianity::Endianity;

/// The synthetic base name given to anonymous types of each kind.
pub fn anonymous_type_base_name(tag: constants::DwTag) -> &'static str {
    match tag {
        constants::DW_TAG_enumeration_type => "__anonymous_enum__",
        constants::DW_TAG_union_type => "__anonymous_union__",
        _ => "__anonymous_struct__",
    }
}

/// The index of an anonymous DIE among the same-kind anonymous
/// children of its parent, so repeated anonymous members do not
/// collide.
pub fn anonymous_index<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                       (source, id): GlobalDie)
                                       -> usize
    where Endian: Endianity
{
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return 0,
    };
    let parent = match info.parent(id) {
        Some(parent) => parent,
        None => return 0,
    };
    let tag = info.die(id).tag();
    let mut index = 0;
    for &sibling in info.children(parent) {
        if sibling == id {
            break;
        }
        if info.die(sibling).tag() == tag && info.name(sibling).is_none() {
            index += 1;
        }
    }
    index
}

/// The DIE's own name: the stated one, or the synthetic anonymous
/// name for nameless class/union/enum DIEs.
pub fn die_name<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                die: GlobalDie)
                                -> String
    where Endian: Endianity
{
    let (source, id) = die;
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return String::new(),
    };
    if let Some(name) = info.name(id) {
        return name.to_string();
    }
    let tag = info.die(id).tag();
    if tag.is_class_or_union_tag() || tag == constants::DW_TAG_enumeration_type {
        let base = anonymous_type_base_name(tag);
        let index = anonymous_index(dwarf, die);
        if index == 0 {
            return base.to_string();
        }
        return format!("{}{}", base, index);
    }
    String::new()
}

/// The `a::b::` scope prefix of a DIE, with imported-unit points
/// resolved, without the trailing separator.
pub fn scope_prefix<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                    die: GlobalDie)
                                    -> String
    where Endian: Endianity
{
    let mut components = Vec::new();
    let mut current = dwarf.logical_parent(die);
    while let Some(parent) = current {
        let (source, id) = parent;
        let info = match dwarf.info(source) {
            Some(info) => info,
            None => break,
        };
        match info.die(id).tag() {
            constants::DW_TAG_compile_unit |
            constants::DW_TAG_partial_unit |
            constants::DW_TAG_type_unit => break,
            constants::DW_TAG_namespace |
            constants::DW_TAG_module |
            constants::DW_TAG_class_type |
            constants::DW_TAG_structure_type |
            constants::DW_TAG_union_type |
            constants::DW_TAG_enumeration_type => {
                components.push(die_name(dwarf, parent));
            }
            _ => {}
        }
        current = dwarf.logical_parent(parent);
    }
    components.reverse();
    components.join("::")
}

/// The fully qualified `scope::name` of a declaration or named type.
pub fn die_qualified_name<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                          die: GlobalDie)
                                          -> String
    where Endian: Endianity
{
    let name = die_name(dwarf, die);
    let prefix = scope_prefix(dwarf, die);
    if prefix.is_empty() {
        name
    } else {
        format!("{}::{}", prefix, name)
    }
}

/// How an integral base-type name was spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntegralName {
    is_signed: bool,
    has_sign_token: bool,
    base: IntegralBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntegralBase {
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

fn parse_integral_name(name: &str) -> Option<IntegralName> {
    let mut is_signed = true;
    let mut has_sign_token = false;
    let mut longs = 0;
    let mut base = None;

    for token in name.split_whitespace() {
        match token {
            "signed" => {
                has_sign_token = true;
            }
            "unsigned" => {
                is_signed = false;
                has_sign_token = true;
            }
            "char" => {
                if base.is_some() {
                    return None;
                }
                base = Some(IntegralBase::Char);
            }
            "short" => {
                if base.is_some() {
                    return None;
                }
                base = Some(IntegralBase::Short);
            }
            "int" => {
                // "int" combines with an already-seen short/long.
                if base.is_none() {
                    base = Some(IntegralBase::Int);
                }
            }
            "long" => {
                longs += 1;
                if longs > 2 {
                    return None;
                }
            }
            _ => return None,
        }
    }

    let base = match (base, longs) {
        (Some(IntegralBase::Char), 0) => IntegralBase::Char,
        (Some(IntegralBase::Short), 0) => IntegralBase::Short,
        (Some(IntegralBase::Int), 0) | (None, 0) if has_sign_token || base.is_some() => {
            IntegralBase::Int
        }
        (Some(IntegralBase::Int), 1) | (None, 1) => IntegralBase::Long,
        (Some(IntegralBase::Int), 2) | (None, 2) => IntegralBase::LongLong,
        _ => return None,
    };

    Some(IntegralName {
        is_signed: is_signed,
        has_sign_token: has_sign_token,
        base: base,
    })
}

/// Collapse spelling variants of integral type names onto one
/// canonical form: `"long unsigned int"`, `"unsigned long"` and
/// `"unsigned long int"` all print as `"unsigned long int"`.
pub fn normalize_integral_name(name: &str) -> String {
    let parsed = match parse_integral_name(name) {
        Some(parsed) => parsed,
        None => return name.to_string(),
    };

    match parsed.base {
        IntegralBase::Char => {
            // Plain "char" is a distinct type from both signed and
            // unsigned char; only an explicit sign token matters.
            if !parsed.has_sign_token {
                "char".to_string()
            } else if parsed.is_signed {
                "signed char".to_string()
            } else {
                "unsigned char".to_string()
            }
        }
        base => {
            let word = match base {
                IntegralBase::Short => "short int",
                IntegralBase::Int => "int",
                IntegralBase::Long => "long int",
                IntegralBase::LongLong => "long long int",
                IntegralBase::Char => unreachable!(),
            };
            if parsed.is_signed {
                word.to_string()
            } else {
                format!("unsigned {}", word)
            }
        }
    }
}

/// The bracketed-dimension suffix of one subrange DIE.
fn subrange_suffix<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                   (source, id): GlobalDie)
                                   -> String
    where Endian: Endianity
{
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return "[]".to_string(),
    };
    let unit = info.unit_of(id);
    let lower = info.unsigned_constant(id, constants::DW_AT_lower_bound)
        .unwrap_or_else(|| unit.language().default_lower_bound());
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
    match upper {
        Some(upper) => format!("[{}..{}]", lower, upper),
        None => "[]".to_string(),
    }
}

/// The element name and dimension suffix of an array DIE, separately,
/// so cv-qualifiers can be re-seated onto the element.
fn array_parts<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                               die: GlobalDie)
                               -> (String, String)
    where Endian: Endianity
{
    let (source, id) = die;
    let element = match dwarf.die_type_reference(die, constants::DW_AT_type) {
        Some(element) => die_pretty_type_name(dwarf, element),
        None => "void".to_string(),
    };
    let mut dims = String::new();
    if let Some(info) = dwarf.info(source) {
        for &child in info.children(id) {
            if info.die(child).tag() == constants::DW_TAG_subrange_type {
                dims.push_str(&subrange_suffix(dwarf, (source, child)));
            }
        }
    }
    if dims.is_empty() {
        dims.push_str("[]");
    }
    (element, dims)
}

/// The deterministic pretty name of a type DIE.
pub fn die_pretty_type_name<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                            die: GlobalDie)
                                            -> String
    where Endian: Endianity
{
    let (source, id) = die;
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return String::new(),
    };
    let tag = info.die(id).tag();

    match tag {
        constants::DW_TAG_base_type => {
            match info.name(id) {
                Some(name) => normalize_integral_name(name),
                None => "void".to_string(),
            }
        }
        constants::DW_TAG_unspecified_type => "void".to_string(),
        constants::DW_TAG_typedef |
        constants::DW_TAG_class_type |
        constants::DW_TAG_structure_type |
        constants::DW_TAG_union_type |
        constants::DW_TAG_enumeration_type |
        constants::DW_TAG_string_type => die_qualified_name(dwarf, die),
        constants::DW_TAG_pointer_type => {
            match dwarf.die_type_reference(die, constants::DW_AT_type) {
                Some(pointee) => format!("{}*", die_pretty_type_name(dwarf, pointee)),
                None => "void*".to_string(),
            }
        }
        constants::DW_TAG_reference_type => {
            match dwarf.die_type_reference(die, constants::DW_AT_type) {
                Some(pointee) => format!("{}&", die_pretty_type_name(dwarf, pointee)),
                None => "void&".to_string(),
            }
        }
        constants::DW_TAG_rvalue_reference_type => {
            match dwarf.die_type_reference(die, constants::DW_AT_type) {
                Some(pointee) => format!("{}&&", die_pretty_type_name(dwarf, pointee)),
                None => "void&&".to_string(),
            }
        }
        constants::DW_TAG_const_type |
        constants::DW_TAG_volatile_type |
        constants::DW_TAG_restrict_type => {
            let token = match tag {
                constants::DW_TAG_const_type => "const",
                constants::DW_TAG_volatile_type => "volatile",
                _ => "restrict",
            };
            let underlying = match dwarf.die_type_reference(die, constants::DW_AT_type) {
                Some(underlying) => underlying,
                // A qualifier with nothing under it collapses to void.
                None => return "void".to_string(),
            };
            let (usource, uid) = underlying;
            let utag = dwarf.info(usource).map(|i| i.die(uid).tag());
            match utag {
                // A const reference is the reference.
                Some(constants::DW_TAG_reference_type) |
                Some(constants::DW_TAG_rvalue_reference_type)
                    if tag == constants::DW_TAG_const_type => {
                    die_pretty_type_name(dwarf, underlying)
                }
                // cv on an array re-seats onto the element.
                Some(constants::DW_TAG_array_type) => {
                    let (element, dims) = array_parts(dwarf, underlying);
                    format!("{} {}{}", token, element, dims)
                }
                _ => format!("{} {}", token, die_pretty_type_name(dwarf, underlying)),
            }
        }
        constants::DW_TAG_array_type => {
            let (element, dims) = array_parts(dwarf, die);
            format!("{}{}", element, dims)
        }
        constants::DW_TAG_subrange_type => subrange_suffix(dwarf, die),
        constants::DW_TAG_subroutine_type |
        constants::DW_TAG_subprogram => function_type_name(dwarf, die),
        _ => die_qualified_name(dwarf, die),
    }
}

/// The pretty name of a function type: return type plus parenthesized
/// parameter list.
fn function_type_name<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                      die: GlobalDie)
                                      -> String
    where Endian: Endianity
{
    let (source, id) = die;
    let return_name = match dwarf.die_type_reference(die, constants::DW_AT_type) {
        Some(ret) => die_pretty_type_name(dwarf, ret),
        None => "void".to_string(),
    };
    let mut params = Vec::new();
    if let Some(info) = dwarf.info(source) {
        for &child in info.children(id) {
            match info.die(child).tag() {
                constants::DW_TAG_formal_parameter => {
                    let name = match dwarf.die_type_reference((source, child),
                                                              constants::DW_AT_type) {
                        Some(ty) => die_pretty_type_name(dwarf, ty),
                        None => "void".to_string(),
                    };
                    params.push(name);
                }
                constants::DW_TAG_unspecified_parameters => {
                    params.push("...".to_string());
                    break;
                }
                _ => {}
            }
        }
    }
    format!("{} ({})", return_name, params.join(", "))
}

/// Whether the method DIE's implicit `this` points at a const class.
pub fn is_const_method<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                       die: GlobalDie)
                                       -> bool
    where Endian: Endianity
{
    let (source, id) = die;
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return false,
    };

    let this_param = dwarf.die_type_reference(die, constants::DW_AT_object_pointer)
        .or_else(|| {
            info.children(id)
                .first()
                .cloned()
                .filter(|&first| {
                    info.die(first).tag() == constants::DW_TAG_formal_parameter &&
                    info.flag(first, constants::DW_AT_artificial)
                })
                .map(|first| (source, first))
        });
    let this_param = match this_param {
        Some(param) => param,
        None => return false,
    };

    // this: pointer -> (const?) class
    let pointer = match dwarf.die_type_reference(this_param, constants::DW_AT_type) {
        Some(pointer) => pointer,
        None => return false,
    };
    let pointee = match dwarf.die_type_reference(pointer, constants::DW_AT_type) {
        Some(pointee) => pointee,
        None => return false,
    };
    let (psource, pid) = pointee;
    dwarf.info(psource)
        .map(|info| info.die(pid).tag() == constants::DW_TAG_const_type)
        .unwrap_or(false)
}

/// The signature of a function declaration: return type, qualified
/// name, parameters, `const` for const methods and a virtual marker.
///
/// C has one flat namespace, so for C-language DIEs the linkage name
/// (or the plain name) is the whole key.
pub fn die_function_signature<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                              die: GlobalDie)
                                              -> String
    where Endian: Endianity
{
    let (source, id) = die;
    let info = match dwarf.info(source) {
        Some(info) => info,
        None => return String::new(),
    };

    if info.unit_of(id).language().is_c_family() {
        if let Some(linkage) = info.linkage_name(id) {
            return linkage.to_string();
        }
        return info.name(id).unwrap_or("").to_string();
    }

    let return_name = match dwarf.die_type_reference(die, constants::DW_AT_type) {
        Some(ret) => die_pretty_type_name(dwarf, ret),
        None => "void".to_string(),
    };
    let qname = die_qualified_name(dwarf, die);

    let mut params = Vec::new();
    for &child in info.children(id) {
        match info.die(child).tag() {
            constants::DW_TAG_formal_parameter => {
                if info.flag(child, constants::DW_AT_artificial) {
                    continue;
                }
                let name = match dwarf.die_type_reference((source, child),
                                                          constants::DW_AT_type) {
                    Some(ty) => die_pretty_type_name(dwarf, ty),
                    None => "void".to_string(),
                };
                params.push(name);
            }
            constants::DW_TAG_unspecified_parameters => {
                params.push("...".to_string());
                break;
            }
            _ => {}
        }
    }

    let virtuality = info.unsigned_constant(id, constants::DW_AT_virtuality)
        .map(constants::DwVirtuality)
        .unwrap_or(constants::DW_VIRTUALITY_none);
    let virtual_marker = if virtuality != constants::DW_VIRTUALITY_none {
        "virtual "
    } else {
        ""
    };
    let const_marker = if is_const_method(dwarf, die) {
        " const"
    } else {
        ""
    };

    format!("{}{} {}({}){}",
            virtual_marker,
            return_name,
            qname,
            params.join(", "),
            const_marker)
}

/// The canonicalization key of a DIE: the pretty type name for types,
/// the signature for functions, the qualified name otherwise.
pub fn die_pretty_name<'input, Endian>(dwarf: &Dwarf<'input, Endian>,
                                       die: GlobalDie)
                                       -> String
    where Endian: Endianity
{
    let (source, id) = die;
    let tag = match dwarf.info(source) {
        Some(info) => info.die(id).tag(),
        None => return String::new(),
    };
    if tag == constants::DW_TAG_subprogram {
        die_function_signature(dwarf, die)
    } else if tag.is_type_tag() || tag == constants::DW_TAG_subroutine_type {
        die_pretty_type_name(dwarf, die)
    } else {
        die_qualified_name(dwarf, die)
    }
}
