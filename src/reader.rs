//! The read context and pipeline: drives one pass over the
//! compilation units, builds IR through the per-tag type-graph rules,
//! then runs the fixup passes and late canonicalization.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use canon::CanonCache;
use constants;
use die::{DieId, DieOffset, DieSource};
use dwarf::{Dwarf, DwarfSections, GlobalDie};
use elf::{self, ElfFile};
use endianity::{BigEndian, Endianity, EndianBuf, LittleEndian};
use expr;
use ir::{Access, BaseSpec, ClassKind, ClassType, Corpus, DataMember, Decl, DeclId,
         DeclKind, EnumType, Enumerator, Environment, FunctionDecl, FunctionType,
         Parameter, Qualifiers, ReadStatus, ScopeId, ScopeKind, SubrangeType,
         TranslationUnit, Type, TypeId, TypeKind, VariableDecl, Virtuality};
use names;
use parse::{Error, Result};
use symbols;
use symbols::{SymbolId, SymbolTable};

/// The configuration of one read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Build every type of every unit, not just the reachable ones.
    pub load_all_types: bool,
    /// Treat the binary as a Linux kernel or module: load the
    /// `__ksymtab` export sets and restrict the exported views to
    /// them.
    pub load_in_linux_kernel_mode: bool,
    /// Skip symbol-table loading entirely.
    pub ignore_symbol_table: bool,
    /// Log counter totals when the read finishes.
    pub show_stats: bool,
    /// Emit per-pass progress logging.
    pub do_log: bool,
    /// Directories searched for the alternate debug-info file.
    pub debug_info_root_paths: Vec<PathBuf>,
}

/// Counter totals of one read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadStats {
    /// Translation units built (after merging).
    pub translation_units: usize,
    /// IR types built.
    pub types_built: usize,
    /// IR declarations built.
    pub decls_built: usize,
    /// DIEs canonicalized in the late pass.
    pub dies_canonicalized: usize,
    /// Types canonicalized outside the DIE association path.
    pub extra_types_canonicalized: usize,
}

#[derive(Debug)]
struct Caches {
    primary: CanonCache,
    alternate: CanonCache,
    type_units: CanonCache,
}

impl Caches {
    fn new() -> Caches {
        Caches {
            primary: CanonCache::new(DieSource::Primary),
            alternate: CanonCache::new(DieSource::Alternate),
            type_units: CanonCache::new(DieSource::TypeUnit),
        }
    }

    fn for_source(&mut self, source: DieSource) -> &mut CanonCache {
        match source {
            DieSource::Primary => &mut self.primary,
            DieSource::Alternate => &mut self.alternate,
            DieSource::TypeUnit => &mut self.type_units,
        }
    }
}

type DieKey = (DieSource, DieOffset);

/// The state machine of one binary's read: every cache, the DWARF
/// handle pair, the symbol maps, the work-in-progress tables, and the
/// fixup worklists.
pub struct ReadContext<'input, 'env, Endian>
    where Endian: Endianity
{
    env: &'env mut Environment,
    dwarf: Dwarf<'input, Endian>,
    elf: Option<ElfFile<'input, Endian>>,
    options: ReadOptions,
    corpus: Corpus,
    suppressed: HashSet<String>,
    caches: Caches,

    die_types: HashMap<DieKey, TypeId>,
    die_decls: HashMap<DieKey, DeclId>,
    wip_types: HashMap<DieKey, TypeId>,
    class_scopes: HashMap<DieKey, ScopeId>,

    decl_only_classes: Vec<(TypeId, usize, String)>,
    class_declarations: HashMap<String, TypeId>,
    class_definitions: HashMap<String, Vec<(TypeId, usize)>>,
    method_symbol_fixups: Vec<DeclId>,
    late_canon: Vec<(DieSource, DieId)>,

    base_type_reuse: HashMap<(String, u64), TypeId>,
    pointer_reuse: HashMap<(TypeId, u64), TypeId>,
    reference_reuse: HashMap<(TypeId, bool, u64), TypeId>,
    qualified_reuse: HashMap<(TypeId, u8), TypeId>,
    namespace_scopes: HashMap<(usize, String), ScopeId>,

    tu_by_path: HashMap<String, usize>,
    unit_tu: HashMap<usize, usize>,
    cur_tu: usize,

    first_new_type: usize,
    first_new_decl: usize,
    stats: ReadStats,
}

impl<'input, 'env, Endian> ReadContext<'input, 'env, Endian>
    where Endian: Endianity
{
    /// A context over already-loaded DWARF and symbols.
    pub fn new(env: &'env mut Environment,
               dwarf: Dwarf<'input, Endian>,
               elf: Option<ElfFile<'input, Endian>>,
               options: ReadOptions,
               corpus: Corpus)
               -> ReadContext<'input, 'env, Endian> {
        let first_new_type = env.type_count();
        let first_new_decl = env.decl_count();
        ReadContext {
            env: env,
            dwarf: dwarf,
            elf: elf,
            options: options,
            corpus: corpus,
            suppressed: HashSet::new(),
            caches: Caches::new(),
            die_types: HashMap::new(),
            die_decls: HashMap::new(),
            wip_types: HashMap::new(),
            class_scopes: HashMap::new(),
            decl_only_classes: Vec::new(),
            class_declarations: HashMap::new(),
            class_definitions: HashMap::new(),
            method_symbol_fixups: Vec::new(),
            late_canon: Vec::new(),
            base_type_reuse: HashMap::new(),
            pointer_reuse: HashMap::new(),
            reference_reuse: HashMap::new(),
            qualified_reuse: HashMap::new(),
            namespace_scopes: HashMap::new(),
            tu_by_path: HashMap::new(),
            unit_tu: HashMap::new(),
            cur_tu: 0,
            first_new_type: first_new_type,
            first_new_decl: first_new_decl,
            stats: ReadStats::default(),
        }
    }

    /// Mark a private type name as suppressed: class and enum DIEs
    /// with this qualified name materialize as opaque
    /// declaration-only types.
    pub fn suppress_type_name(&mut self, name: &str) {
        self.suppressed.insert(name.to_string());
    }

    /// Run the pipeline and hand the corpus over.
    pub fn read(mut self) -> Result<Corpus> {
        if self.options.do_log {
            debug!("building IR for {}", self.corpus.path);
        }
        for unit_index in 0..self.dwarf.primary().units().len() {
            self.read_unit(unit_index);
        }

        if self.options.do_log {
            debug!("resolving declaration-only classes");
        }
        self.resolve_declaration_only_classes();

        if self.options.do_log {
            debug!("rebinding virtual-method symbols");
        }
        self.fixup_virtual_method_symbols();

        if self.options.do_log {
            debug!("late canonicalization of {} DIEs", self.late_canon.len());
        }
        self.late_canonicalize();

        self.collect_exported_decls();

        self.stats.translation_units = self.corpus.translation_units().len();
        if self.options.show_stats {
            info!("read {}: {} translation units, {} types, {} decls, \
                   {} DIEs canonicalized ({} extra)",
                  self.corpus.path,
                  self.stats.translation_units,
                  self.stats.types_built,
                  self.stats.decls_built,
                  self.stats.dies_canonicalized,
                  self.stats.extra_types_canonicalized);
        }

        Ok(self.corpus)
    }

    /// The accumulated counters.
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    // ----- translation units -----

    fn read_unit(&mut self, unit_index: usize) {
        let (root, unit_offset, language, is_partial) = {
            let info = self.dwarf.primary();
            let unit = &info.units()[unit_index];
            let root = unit.root();
            if (root.0 as usize) >= info.die_count() {
                return;
            }
            (root,
             unit.offset(),
             unit.language(),
             info.die(root).tag() != constants::DW_TAG_compile_unit)
        };
        // Partial and type units are only read through references and
        // imported-unit points.
        if is_partial {
            return;
        }

        let (path, comp_dir) = {
            let info = self.dwarf.primary();
            (info.name(root).unwrap_or("").to_string(),
             self.dwarf
                 .primary()
                 .attr_value(root, constants::DW_AT_comp_dir)
                 .and_then(|v| info.string_value(v))
                 .map(|s| s.to_string()))
        };

        // Two units with one absolute path merge into one translation
        // unit.
        let merge_key = if path.is_empty() {
            format!("<unit at {:#x}>", unit_offset)
        } else if path.starts_with('/') {
            path.clone()
        } else {
            match comp_dir {
                Some(ref dir) => format!("{}/{}", dir, path),
                None => path.clone(),
            }
        };
        let tu_index = match self.tu_by_path.get(&merge_key).cloned() {
            Some(existing) => existing,
            None => {
                let global = self.env.add_scope(ScopeKind::Global, None);
                let tu = TranslationUnit::new(path, comp_dir, language, global);
                let index = self.corpus.add_translation_unit(tu);
                self.tu_by_path.insert(merge_key, index);
                index
            }
        };
        self.unit_tu.insert(unit_offset, tu_index);
        self.cur_tu = tu_index;

        if self.options.do_log {
            debug!("reading unit at {:#x} into TU #{}", unit_offset, tu_index);
        }

        self.build_children(DieSource::Primary, root);
    }

    fn build_children(&mut self, source: DieSource, parent: DieId) {
        let children: Vec<DieId> = match self.dwarf.info(source) {
            Some(info) => info.children(parent).to_vec(),
            None => return,
        };
        for child in children {
            self.build_toplevel_die(source, child);
        }
    }

    fn build_toplevel_die(&mut self, source: DieSource, id: DieId) {
        let tag = match self.dwarf.info(source) {
            Some(info) => info.die(id).tag(),
            None => return,
        };
        match tag {
            constants::DW_TAG_namespace |
            constants::DW_TAG_module => {
                self.build_children(source, id);
            }
            constants::DW_TAG_imported_unit => {
                // Inline the imported unit's children at this point.
                if let Some(info) = self.dwarf.info(source) {
                    if let Some(reference) =
                        info.die_reference(id, constants::DW_AT_import) {
                        if let Some((imp_source, imp_id)) =
                            self.dwarf.resolve_reference(source, reference) {
                            self.build_children(imp_source, imp_id);
                            return;
                        }
                    }
                }
            }
            constants::DW_TAG_subprogram => {
                self.build_function_decl(source, id);
            }
            constants::DW_TAG_variable => {
                self.build_variable_decl(source, id);
            }
            _ if tag.is_type_tag() || tag == constants::DW_TAG_subroutine_type => {
                if self.options.load_all_types {
                    self.type_of_die(source, id);
                }
            }
            _ => {}
        }
    }

    // ----- the type graph builder -----

    /// The IR type of a DIE, built on first demand. Work-in-progress
    /// aggregates short-circuit to their shell so cyclic graphs
    /// terminate.
    pub fn type_of_die(&mut self, source: DieSource, id: DieId) -> TypeId {
        let offset = match self.dwarf.info(source) {
            Some(info) => info.die(id).offset(),
            None => return self.env.void_type(),
        };
        let key = (source, offset);
        if let Some(&wip) = self.wip_types.get(&key) {
            return wip;
        }
        if let Some(&done) = self.die_types.get(&key) {
            return done;
        }

        let tag = self.dwarf.info(source).map(|info| info.die(id).tag());
        let ty = match tag {
            Some(constants::DW_TAG_base_type) => self.build_base_type(source, id),
            Some(constants::DW_TAG_typedef) => self.build_typedef(source, id),
            Some(constants::DW_TAG_pointer_type) => self.build_pointer(source, id),
            Some(constants::DW_TAG_reference_type) => {
                self.build_reference(source, id, true)
            }
            Some(constants::DW_TAG_rvalue_reference_type) => {
                self.build_reference(source, id, false)
            }
            Some(constants::DW_TAG_const_type) => {
                self.build_qualified(source, id, Qualifiers::CONST)
            }
            Some(constants::DW_TAG_volatile_type) => {
                self.build_qualified(source, id, Qualifiers::VOLATILE)
            }
            Some(constants::DW_TAG_restrict_type) => {
                self.build_qualified(source, id, Qualifiers::RESTRICT)
            }
            Some(constants::DW_TAG_array_type) => self.build_array(source, id),
            Some(constants::DW_TAG_subrange_type) => self.build_subrange(source, id),
            Some(constants::DW_TAG_enumeration_type) => self.build_enum(source, id),
            Some(constants::DW_TAG_class_type) => {
                self.build_class(source, id, ClassKind::Class)
            }
            Some(constants::DW_TAG_structure_type) => {
                self.build_class(source, id, ClassKind::Struct)
            }
            Some(constants::DW_TAG_union_type) => {
                self.build_class(source, id, ClassKind::Union)
            }
            Some(constants::DW_TAG_subroutine_type) => {
                self.build_function_type(source, id, None)
            }
            // A DIE that does not express a type is read as void
            // rather than failing the read.
            _ => self.env.void_type(),
        };

        self.die_types.insert(key, ty);
        self.late_canon.push((source, id));
        self.stats.types_built += 1;
        ty
    }

    fn resolved_type_of(&mut self,
                        source: DieSource,
                        id: DieId,
                        attr: constants::DwAt)
                        -> Option<TypeId> {
        let target = self.dwarf.die_type_reference((source, id), attr)?;
        Some(self.type_of_die(target.0, target.1))
    }

    fn build_base_type(&mut self, source: DieSource, id: DieId) -> TypeId {
        let (name, size) = {
            let info = self.dwarf.info(source).expect("checked by caller");
            (info.name(id).map(|s| s.to_string()),
             info.size_in_bits(id).unwrap_or(0))
        };

        if size == 0 && name.as_ref().map(|n| n == "void").unwrap_or(true) {
            return self.env.void_type();
        }

        let normalized = match name {
            Some(ref name) => names::normalize_integral_name(name),
            None => "void".to_string(),
        };
        if let Some(&reused) = self.base_type_reuse.get(&(normalized.clone(), size)) {
            return reused;
        }

        let istr = self.env.intern(&normalized);
        let ty = self.env.add_type(Type::new(TypeKind::Base {
            name: istr,
            size_bits: size,
        }));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        self.base_type_reuse.insert((normalized, size), ty);
        ty
    }

    fn build_typedef(&mut self, source: DieSource, id: DieId) -> TypeId {
        let underlying = self.resolved_type_of(source, id, constants::DW_AT_type)
            .unwrap_or_else(|| self.env.void_type());
        let name = {
            let info = self.dwarf.info(source).expect("checked by caller");
            info.name(id).unwrap_or("").to_string()
        };
        let istr = self.env.intern(&name);
        let ty = self.env.add_type(Type::new(TypeKind::Typedef {
            name: istr,
            underlying: underlying,
        }));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);

        // An anonymous class gets this typedef as its naming typedef.
        let is_anonymous_class = match self.env.type_(underlying).kind {
            TypeKind::Class(ref class) => class.name.is_none(),
            _ => false,
        };
        if is_anonymous_class {
            if let TypeKind::Class(ref mut class) =
                self.env.type_mut(underlying).kind {
                if class.naming_typedef.is_none() {
                    class.naming_typedef = Some(ty);
                }
            }
        }
        ty
    }

    fn pointer_size_bits(&mut self, source: DieSource, id: DieId) -> u64 {
        let info = self.dwarf.info(source).expect("checked by caller");
        let address_bits = info.unit_of(id).address_size() as u64 * 8;
        match info.size_in_bits(id) {
            // A stated size must equal the unit's address size; a
            // disagreeing one is malformed and ignored.
            Some(stated) if stated == address_bits => stated,
            _ => address_bits,
        }
    }

    fn build_pointer(&mut self, source: DieSource, id: DieId) -> TypeId {
        let pointee = self.resolved_type_of(source, id, constants::DW_AT_type)
            .unwrap_or_else(|| self.env.void_type());
        let size = self.pointer_size_bits(source, id);
        if let Some(&reused) = self.pointer_reuse.get(&(pointee, size)) {
            return reused;
        }
        let ty = self.env.add_type(Type::new(TypeKind::Pointer {
            pointee: pointee,
            size_bits: size,
        }));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        self.pointer_reuse.insert((pointee, size), ty);
        ty
    }

    fn build_reference(&mut self,
                       source: DieSource,
                       id: DieId,
                       is_lvalue: bool)
                       -> TypeId {
        let pointee = self.resolved_type_of(source, id, constants::DW_AT_type)
            .unwrap_or_else(|| self.env.void_type());
        let size = self.pointer_size_bits(source, id);
        if let Some(&reused) = self.reference_reuse.get(&(pointee, is_lvalue, size)) {
            return reused;
        }
        let ty = self.env.add_type(Type::new(TypeKind::Reference {
            pointee: pointee,
            is_lvalue: is_lvalue,
            size_bits: size,
        }));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        self.reference_reuse.insert((pointee, is_lvalue, size), ty);
        ty
    }

    fn get_or_make_qualified(&mut self,
                             underlying: TypeId,
                             quals: Qualifiers,
                             scope: ScopeId)
                             -> TypeId {
        // Qualifying a qualified type folds the sets together.
        let (underlying, quals) = match self.env.type_(underlying).kind {
            TypeKind::Qualified { underlying: inner, quals: inner_quals } => {
                (inner, quals | inner_quals)
            }
            _ => (underlying, quals),
        };
        if let Some(&reused) = self.qualified_reuse.get(&(underlying, quals.bits())) {
            return reused;
        }
        let ty = self.env.add_type(Type::new(TypeKind::Qualified {
            underlying: underlying,
            quals: quals,
        }));
        self.env.add_type_to_scope(ty, scope);
        self.qualified_reuse.insert((underlying, quals.bits()), ty);
        ty
    }

    /// Build a cv-qualified type, applying the normalisation rules:
    /// const-reference collapses to the reference, const-void to
    /// void, and cv on an array re-seats onto the element type. The
    /// affected types have no canonical representative yet, since
    /// canonicalization only runs after the build pass.
    fn build_qualified(&mut self,
                       source: DieSource,
                       id: DieId,
                       quals: Qualifiers)
                       -> TypeId {
        let underlying = self.resolved_type_of(source, id, constants::DW_AT_type);
        let scope = self.scope_for_die(source, id);

        let underlying = match underlying {
            Some(underlying) => underlying,
            None => return self.env.void_type(),
        };

        let is_reference = match self.env.type_(underlying).kind {
            TypeKind::Reference { .. } => true,
            _ => false,
        };
        let is_void = match self.env.type_(underlying).kind {
            TypeKind::Void => true,
            _ => false,
        };
        // const T& is the same type as T&, and const void is void.
        if quals == Qualifiers::CONST && (is_reference || is_void) {
            return underlying;
        }

        // cv on an array applies to the elements, not the aggregate.
        let array_element = match self.env.type_(underlying).kind {
            TypeKind::Array { element, .. } => Some(element),
            _ => None,
        };
        if let Some(element) = array_element {
            let already = match self.env.type_(element).kind {
                TypeKind::Qualified { quals: existing, .. } => existing.contains(quals),
                _ => false,
            };
            if !already {
                let qualified_elem = self.get_or_make_qualified(element, quals, scope);
                if let TypeKind::Array { element: ref mut slot, .. } =
                    self.env.type_mut(underlying).kind {
                    *slot = qualified_elem;
                }
            }
            return underlying;
        }

        self.get_or_make_qualified(underlying, quals, scope)
    }

    fn build_subrange(&mut self, source: DieSource, id: DieId) -> TypeId {
        let (name, lower, upper) = {
            let info = self.dwarf.info(source).expect("checked by caller");
            let language = info.unit_of(id).language();
            let lower = info.unsigned_constant(id, constants::DW_AT_lower_bound)
                .unwrap_or_else(|| language.default_lower_bound());
            let upper = match info.unsigned_constant(id, constants::DW_AT_upper_bound) {
                // UINT64_MAX upper bounds mark unknown extents in the
                // corpora this reader grew up on.
                Some(upper) if upper != ::std::u64::MAX => Some(upper),
                Some(_) => None,
                None => {
                    match info.unsigned_constant(id, constants::DW_AT_count) {
                        Some(0) | None => None,
                        Some(count) => Some(lower + count - 1),
                    }
                }
            };
            (info.name(id).map(|s| s.to_string()), lower, upper)
        };

        let underlying = self.resolved_type_of(source, id, constants::DW_AT_type);
        let name = name.map(|n| self.env.intern(&n));
        let ty = self.env.add_type(Type::new(TypeKind::Subrange(SubrangeType {
            name: name,
            lower: lower,
            upper: upper,
            underlying: underlying,
        })));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        ty
    }

    fn build_array(&mut self, source: DieSource, id: DieId) -> TypeId {
        let element = self.resolved_type_of(source, id, constants::DW_AT_type)
            .unwrap_or_else(|| self.env.void_type());
        let children: Vec<DieId> = {
            let info = self.dwarf.info(source).expect("checked by caller");
            info.children(id)
                .iter()
                .cloned()
                .filter(|&c| info.die(c).tag() == constants::DW_TAG_subrange_type)
                .collect()
        };
        let mut subranges = Vec::with_capacity(children.len());
        for child in children {
            subranges.push(self.type_of_die(source, child));
        }

        let ty = self.env.add_type(Type::new(TypeKind::Array {
            element: element,
            subranges: subranges,
        }));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        ty
    }

    fn build_enum(&mut self, source: DieSource, id: DieId) -> TypeId {
        let (name, size, is_decl_only, enumerator_dies, anon_index) = {
            let info = self.dwarf.info(source).expect("checked by caller");
            let enumerators: Vec<DieId> = info.children(id)
                .iter()
                .cloned()
                .filter(|&c| info.die(c).tag() == constants::DW_TAG_enumerator)
                .collect();
            (info.name(id).map(|s| s.to_string()),
             info.size_in_bits(id).unwrap_or(32),
             info.flag(id, constants::DW_AT_declaration),
             enumerators,
             names::anonymous_index(&self.dwarf, (source, id)) as u32)
        };

        let qualified = names::die_qualified_name(&self.dwarf, (source, id));
        let suppressed = self.suppressed.contains(&qualified);

        let mut enumerators = Vec::new();
        if !suppressed {
            let raw: Vec<(String, i64)> = {
                let info = self.dwarf.info(source).expect("checked by caller");
                enumerator_dies.iter()
                    .map(|&e| {
                        (info.name(e).unwrap_or("").to_string(),
                         info.signed_constant(e, constants::DW_AT_const_value)
                             .unwrap_or(0))
                    })
                    .collect()
            };
            for (name, value) in raw {
                let istr = self.env.intern(&name);
                enumerators.push(Enumerator {
                    name: istr,
                    value: value,
                });
            }
        }

        // The underlying integer type is synthesized at the enum's
        // size.
        let underlying_key = ("unnamed-enum-underlying-type".to_string(), size);
        let underlying = match self.base_type_reuse.get(&underlying_key).cloned() {
            Some(existing) => existing,
            None => {
                let istr = self.env.intern("unnamed-enum-underlying-type");
                let ty = self.env.add_type(Type::new(TypeKind::Base {
                    name: istr,
                    size_bits: size,
                }));
                self.base_type_reuse.insert(underlying_key, ty);
                ty
            }
        };

        let name = name.map(|n| self.env.intern(&n));
        let ty = self.env.add_type(Type::new(TypeKind::Enum(EnumType {
            name: name,
            size_bits: size,
            underlying: underlying,
            enumerators: enumerators,
            anonymous_index: if name.is_none() { Some(anon_index) } else { None },
            is_declaration_only: is_decl_only || suppressed,
        })));
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        ty
    }

    fn access_of(&self,
                 source: DieSource,
                 id: DieId,
                 default: Access)
                 -> Access {
        let info = match self.dwarf.info(source) {
            Some(info) => info,
            None => return default,
        };
        match info.unsigned_constant(id, constants::DW_AT_accessibility)
            .map(constants::DwAccess) {
            Some(constants::DW_ACCESS_public) => Access::Public,
            Some(constants::DW_ACCESS_protected) => Access::Protected,
            Some(constants::DW_ACCESS_private) => Access::Private,
            _ => default,
        }
    }

    fn member_offset_bits(&self, source: DieSource, id: DieId) -> Option<u64> {
        let info = self.dwarf.info(source)?;
        if let Some(offset) =
            info.unsigned_constant(id, constants::DW_AT_data_member_location) {
            return Some(offset * 8);
        }
        let expr_bytes = info.expression(id, constants::DW_AT_data_member_location)?;
        expr::member_offset_in_bits(EndianBuf::<Endian>::new(expr_bytes),
                                    info.unit_of(id).address_size())
    }

    /// Whether a member is the compiler-inserted vtable pointer:
    /// `_vptr` followed by a non-identifier character.
    fn is_vptr_member(name: &str) -> bool {
        if !name.starts_with("_vptr") {
            return false;
        }
        match name.as_bytes().get(5) {
            None => true,
            Some(&c) => !(c as char).is_alphanumeric() && c != b'_',
        }
    }

    fn build_class(&mut self,
                   source: DieSource,
                   id: DieId,
                   kind: ClassKind)
                   -> TypeId {
        let offset = self.dwarf
            .info(source)
            .expect("checked by caller")
            .die(id)
            .offset();
        let key = (source, offset);

        let (name, size, is_decl_only, decl_location, anon_index) = {
            let info = self.dwarf.info(source).expect("checked by caller");
            (info.name(id).map(|s| s.to_string()),
             info.size_in_bits(id).unwrap_or(0),
             info.flag(id, constants::DW_AT_declaration),
             info.decl_location(id),
             names::anonymous_index(&self.dwarf, (source, id)) as u32)
        };
        let qualified = names::die_qualified_name(&self.dwarf, (source, id));
        let suppressed = self.suppressed.contains(&qualified);
        let effective_decl_only = is_decl_only || suppressed;

        // A declaration-only DIE reuses an earlier declaration of the
        // same qualified name rather than multiplying shells.
        if effective_decl_only {
            if let Some(&existing) = self.class_declarations.get(&qualified) {
                return existing;
            }
        }

        let parent_scope = self.scope_for_die(source, id);

        // Phase one: the shell, registered as work-in-progress before
        // any child is built so cycles resolve to it.
        let name_istr = name.as_ref().map(|n| self.env.intern(n));
        let ty = self.env.add_type(Type::new(TypeKind::Class(ClassType {
            name: name_istr,
            kind: kind,
            size_bits: size,
            is_declaration_only: effective_decl_only,
            definition: None,
            bases: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
            member_types: Vec::new(),
            naming_typedef: None,
            anonymous_index: if name.is_none() { Some(anon_index) } else { None },
            decl_location: decl_location,
        })));
        self.env.add_type_to_scope(ty, parent_scope);
        let body_scope = self.env.add_scope(ScopeKind::ClassBody(ty), Some(parent_scope));
        self.class_scopes.insert(key, body_scope);

        if effective_decl_only {
            self.class_declarations.insert(qualified.clone(), ty);
            self.decl_only_classes.push((ty, self.cur_tu, qualified));
            return ty;
        }

        self.wip_types.insert(key, ty);

        // Phase two: populate.
        let children: Vec<DieId> = {
            let info = self.dwarf.info(source).expect("checked by caller");
            info.children(id).to_vec()
        };
        let default_access = kind.default_access();

        for child in children {
            let child_tag = self.dwarf
                .info(source)
                .expect("checked by caller")
                .die(child)
                .tag();
            match child_tag {
                constants::DW_TAG_inheritance => {
                    let base = match self.resolved_type_of(source,
                                                           child,
                                                           constants::DW_AT_type) {
                        Some(base) => base,
                        None => continue,
                    };
                    let inheritance_default = match kind {
                        ClassKind::Struct => Access::Public,
                        _ => Access::Private,
                    };
                    let access = self.access_of(source, child, inheritance_default);
                    let offset_bits =
                        self.member_offset_bits(source, child).unwrap_or(0);
                    let is_virtual = {
                        let info = self.dwarf.info(source).expect("checked");
                        info.unsigned_constant(child, constants::DW_AT_virtuality)
                            .map(|v| constants::DwVirtuality(v) !=
                                     constants::DW_VIRTUALITY_none)
                            .unwrap_or(false)
                    };
                    let spec = BaseSpec {
                        base: base,
                        access: access,
                        offset_bits: offset_bits,
                        is_virtual: is_virtual,
                    };
                    if let TypeKind::Class(ref mut class) = self.env.type_mut(ty).kind {
                        class.bases.push(spec);
                    }
                }
                constants::DW_TAG_member => {
                    let member_name = {
                        let info = self.dwarf.info(source).expect("checked");
                        info.name(child).unwrap_or("").to_string()
                    };
                    if Self::is_vptr_member(&member_name) {
                        continue;
                    }
                    let mem_type = self.resolved_type_of(source,
                                                         child,
                                                         constants::DW_AT_type)
                        .unwrap_or_else(|| self.env.void_type());
                    let offset_bits = self.member_offset_bits(source, child);
                    let access = self.access_of(source, child, default_access);
                    let istr = self.env.intern(&member_name);
                    let member = DataMember {
                        name: istr,
                        mem_type: mem_type,
                        offset_bits: offset_bits,
                        access: access,
                    };
                    if let TypeKind::Class(ref mut class) = self.env.type_mut(ty).kind {
                        class.members.push(member);
                    }
                }
                constants::DW_TAG_variable => {
                    // A variable child is a static data member.
                    let _ = self.build_static_member(source,
                                                     child,
                                                     body_scope,
                                                     default_access);
                }
                constants::DW_TAG_subprogram => {
                    if let Some(method) =
                        self.build_method(source, child, ty, body_scope, default_access) {
                        if let TypeKind::Class(ref mut class) =
                            self.env.type_mut(ty).kind {
                            class.methods.push(method);
                        }
                    }
                }
                _ if child_tag.is_type_tag() => {
                    let member_type = self.type_of_die(source, child);
                    if let TypeKind::Class(ref mut class) = self.env.type_mut(ty).kind {
                        class.member_types.push(member_type);
                    }
                }
                _ => {}
            }
        }

        self.wip_types.remove(&key);
        self.class_definitions
            .entry(qualified)
            .or_insert_with(Vec::new)
            .push((ty, self.cur_tu));
        ty
    }

    fn build_static_member(&mut self,
                           source: DieSource,
                           id: DieId,
                           scope: ScopeId,
                           default_access: Access)
                           -> Option<DeclId> {
        let offset = self.dwarf.info(source)?.die(id).offset();
        if let Some(&existing) = self.die_decls.get(&(source, offset)) {
            return Some(existing);
        }
        let (name, linkage) = {
            let info = self.dwarf.info(source)?;
            (info.name(id)?.to_string(),
             info.linkage_name(id).map(|s| s.to_string()))
        };
        let var_type = self.resolved_type_of(source, id, constants::DW_AT_type)
            .unwrap_or_else(|| self.env.void_type());
        let access = self.access_of(source, id, default_access);

        let name_istr = self.env.intern(&name);
        let linkage_istr = linkage.map(|l| self.env.intern(&l));
        let decl = self.env.add_decl(Decl {
            kind: DeclKind::Variable(VariableDecl {
                name: name_istr,
                linkage_name: linkage_istr,
                var_type: var_type,
                symbol: None,
                address: None,
                is_tls: false,
                is_static_member: true,
                access: Some(access),
            }),
            scope: scope,
        });
        self.die_decls.insert((source, offset), decl);
        self.stats.decls_built += 1;
        Some(decl)
    }

    fn build_method(&mut self,
                    source: DieSource,
                    id: DieId,
                    class: TypeId,
                    scope: ScopeId,
                    default_access: Access)
                    -> Option<DeclId> {
        let offset = self.dwarf.info(source)?.die(id).offset();
        if let Some(&existing) = self.die_decls.get(&(source, offset)) {
            return Some(existing);
        }

        let fn_type = self.build_function_type(source, id, Some(class));
        self.die_types.insert((source, offset), fn_type);
        self.late_canon.push((source, id));

        let (name, linkage, address, virtuality, is_external) = {
            let info = self.dwarf.info(source)?;
            let virtuality = info.unsigned_constant(id, constants::DW_AT_virtuality)
                .map(constants::DwVirtuality)
                .unwrap_or(constants::DW_VIRTUALITY_none);
            (info.name(id).unwrap_or("").to_string(),
             info.linkage_name(id).map(|s| s.to_string()),
             info.address(id, constants::DW_AT_low_pc),
             virtuality,
             info.flag(id, constants::DW_AT_external))
        };
        let _ = is_external;

        let class_name = match self.env.type_(class).kind {
            TypeKind::Class(ref c) => {
                c.name.map(|n| self.env.str(n).to_string()).unwrap_or_default()
            }
            _ => String::new(),
        };
        let is_ctor = !name.is_empty() && name == class_name;
        let is_dtor = name.starts_with('~');
        if is_ctor || is_dtor {
            if let TypeKind::Function(ref mut f) = self.env.type_mut(fn_type).kind {
                f.return_type = None;
            }
        }

        let virtuality = match virtuality {
            constants::DW_VIRTUALITY_virtual => Virtuality::Virtual,
            constants::DW_VIRTUALITY_pure_virtual => Virtuality::PureVirtual,
            _ => Virtuality::None,
        };
        let vtable_index = if virtuality != Virtuality::None {
            let info = self.dwarf.info(source)?;
            match info.unsigned_constant(id, constants::DW_AT_vtable_elem_location) {
                Some(index) => Some(index),
                None => {
                    info.expression(id, constants::DW_AT_vtable_elem_location)
                        .and_then(|bytes| {
                            expr::evaluate(EndianBuf::<Endian>::new(bytes),
                                           info.unit_of(id).address_size())
                                .value
                        })
                }
            }
        } else {
            None
        };

        let is_static = match self.env.type_(fn_type).kind {
            TypeKind::Function(ref f) => f.class.is_none(),
            _ => false,
        };
        let access = self.access_of(source, id, default_access);

        // Methods bind by address only here; virtual methods with a
        // linkage name and no address are rebound by the fixup pass.
        let symbol = address.and_then(|a| self.symbol_for_address(a));

        let name_istr = self.env.intern(&name);
        let linkage_istr = linkage.map(|l| self.env.intern(&l));
        let decl = self.env.add_decl(Decl {
            kind: DeclKind::Function(FunctionDecl {
                name: name_istr,
                linkage_name: linkage_istr,
                signature: fn_type,
                symbol: symbol,
                address: address,
                access: Some(access),
                is_static: is_static,
                is_ctor: is_ctor,
                is_dtor: is_dtor,
                virtuality: virtuality,
                vtable_index: vtable_index,
            }),
            scope: scope,
        });
        self.die_decls.insert((source, offset), decl);
        self.stats.decls_built += 1;

        // A virtual method carrying a linkage name but no symbol yet
        // is rebound from the function symbol map after the build
        // pass.
        if virtuality != Virtuality::None && symbol.is_none() {
            if self.env.decl(decl).linkage_name().is_some() {
                self.method_symbol_fixups.push(decl);
            }
        }

        Some(decl)
    }

    /// Build a function type, detecting method-ness through the
    /// object pointer or an implicit artificial first parameter
    /// pointing at the enclosing class.
    fn build_function_type(&mut self,
                           source: DieSource,
                           id: DieId,
                           class_hint: Option<TypeId>)
                           -> TypeId {
        let offset = self.dwarf
            .info(source)
            .expect("checked by caller")
            .die(id)
            .offset();
        let key = (source, offset);
        if let Some(&wip) = self.wip_types.get(&key) {
            return wip;
        }

        let ty = self.env.add_type(Type::new(TypeKind::Function(FunctionType {
            return_type: None,
            parameters: Vec::new(),
            class: None,
            is_const: false,
        })));
        self.wip_types.insert(key, ty);

        let return_type = self.resolved_type_of(source, id, constants::DW_AT_type);

        let has_object_pointer = {
            let info = self.dwarf.info(source).expect("checked by caller");
            info.die_reference(id, constants::DW_AT_object_pointer).is_some()
        };
        let is_const = names::is_const_method(&self.dwarf, (source, id));

        let children: Vec<DieId> = {
            let info = self.dwarf.info(source).expect("checked by caller");
            info.children(id).to_vec()
        };

        let mut parameters = Vec::new();
        let mut implicit_this_class = None;
        for (index, child) in children.iter().enumerate() {
            let child = *child;
            let tag = self.dwarf
                .info(source)
                .expect("checked by caller")
                .die(child)
                .tag();
            match tag {
                constants::DW_TAG_formal_parameter => {
                    let (param_name, is_artificial) = {
                        let info = self.dwarf.info(source).expect("checked");
                        (info.name(child).map(|s| s.to_string()),
                         info.flag(child, constants::DW_AT_artificial))
                    };
                    let param_type = self.resolved_type_of(source,
                                                           child,
                                                           constants::DW_AT_type)
                        .unwrap_or_else(|| self.env.void_type());

                    if index == 0 && is_artificial && implicit_this_class.is_none() {
                        implicit_this_class = self.class_pointed_to(param_type);
                    }

                    let name_istr = param_name.map(|n| self.env.intern(&n));
                    parameters.push(Parameter {
                        name: name_istr,
                        param_type: param_type,
                        is_variadic: false,
                        is_artificial: is_artificial,
                    });
                }
                constants::DW_TAG_unspecified_parameters => {
                    // The variadic marker ends parameter collection.
                    let variadic = self.env.variadic_type();
                    parameters.push(Parameter {
                        name: None,
                        param_type: variadic,
                        is_variadic: true,
                        is_artificial: false,
                    });
                    break;
                }
                _ => {}
            }
        }

        let class = if has_object_pointer || implicit_this_class.is_some() {
            class_hint.or(implicit_this_class)
        } else {
            None
        };

        if let TypeKind::Function(ref mut f) = self.env.type_mut(ty).kind {
            f.return_type = return_type;
            f.parameters = parameters;
            f.class = class;
            f.is_const = is_const;
        }

        self.wip_types.remove(&key);
        let scope = self.scope_for_die(source, id);
        self.env.add_type_to_scope(ty, scope);
        ty
    }

    /// The class a `this`-style pointer parameter points at, chasing
    /// one level of cv-qualification.
    fn class_pointed_to(&self, param_type: TypeId) -> Option<TypeId> {
        let pointee = match self.env.type_(param_type).kind {
            TypeKind::Pointer { pointee, .. } => pointee,
            _ => return None,
        };
        let target = match self.env.type_(pointee).kind {
            TypeKind::Qualified { underlying, .. } => underlying,
            _ => pointee,
        };
        match self.env.type_(target).kind {
            TypeKind::Class(_) => Some(target),
            _ => None,
        }
    }

    // ----- declarations -----

    fn origin_target(&self, source: DieSource, id: DieId) -> Option<GlobalDie> {
        let info = self.dwarf.info(source)?;
        let reference = info.die_reference(id, constants::DW_AT_specification)
            .or_else(|| info.die_reference(id, constants::DW_AT_abstract_origin))?;
        self.dwarf.resolve_reference(source, reference)
    }

    fn bind_function_symbol(&mut self,
                            address: Option<u64>,
                            linkage: Option<&str>)
                            -> Option<SymbolId> {
        if let Some(address) = address {
            if let Some(id) = self.symbol_for_address(address) {
                return Some(id);
            }
        }
        let linkage = linkage?;
        // Name lookups go through the hash sections when the binary
        // carries them.
        if let Some(ref elf) = self.elf {
            if let Some(id) =
                symbols::lookup_symbol_by_name(elf, &self.corpus.symtab, linkage) {
                if self.corpus.symtab.symbol(id).is_defined {
                    return Some(self.corpus.symtab.main_symbol(id));
                }
            }
        }
        self.corpus
            .symtab
            .defined_function_symbols()
            .get(linkage)
            .cloned()
            .map(|id| self.corpus.symtab.main_symbol(id))
    }

    /// An address-to-symbol lookup that chases ppc64 ELFv1 function
    /// descriptors when the straight lookup misses.
    fn symbol_for_address(&self, address: u64) -> Option<SymbolId> {
        if let Some(id) = self.corpus.symtab.symbol_at_address(address) {
            return Some(id);
        }
        let elf = self.elf.as_ref()?;
        let entry = elf.opd_entry_point(address)?;
        self.corpus.symtab.symbol_at_address(entry)
    }

    fn build_function_decl(&mut self, source: DieSource, id: DieId) -> Option<DeclId> {
        let offset = self.dwarf.info(source)?.die(id).offset();
        if let Some(&existing) = self.die_decls.get(&(source, offset)) {
            return Some(existing);
        }

        // A clone site continues the referenced declaration: merge
        // the linkage name, address and symbol into it.
        if let Some((origin_source, origin_id)) = self.origin_target(source, id) {
            let origin_offset = self.dwarf.info(origin_source)?.die(origin_id).offset();
            // Materialize the origin, typically by building its
            // enclosing class.
            if self.die_decls.get(&(origin_source, origin_offset)).is_none() {
                if let Some((psource, pid)) =
                    self.dwarf.logical_parent((origin_source, origin_id)) {
                    let parent_tag = self.dwarf.info(psource)?.die(pid).tag();
                    if parent_tag.is_class_or_union_tag() {
                        self.type_of_die(psource, pid);
                    }
                }
            }
            if let Some(&origin_decl) =
                self.die_decls.get(&(origin_source, origin_offset)) {
                let (linkage, address) = {
                    let info = self.dwarf.info(source)?;
                    (info.linkage_name(id).map(|s| s.to_string()),
                     info.address(id, constants::DW_AT_low_pc))
                };
                let symbol =
                    self.bind_function_symbol(address,
                                              linkage.as_ref().map(|s| &s[..]));
                let linkage_istr = linkage.map(|l| self.env.intern(&l));
                if let DeclKind::Function(ref mut f) =
                    self.env.decl_mut(origin_decl).kind {
                    if f.linkage_name.is_none() {
                        f.linkage_name = linkage_istr;
                    }
                    if f.address.is_none() {
                        f.address = address;
                    }
                    if f.symbol.is_none() {
                        f.symbol = symbol;
                    }
                }
                self.die_decls.insert((source, offset), origin_decl);
                return Some(origin_decl);
            }
        }

        let (name, linkage, address, is_artificial) = {
            let info = self.dwarf.info(source)?;
            (info.name(id).unwrap_or("").to_string(),
             info.linkage_name(id).map(|s| s.to_string()),
             info.address(id, constants::DW_AT_low_pc),
             info.flag(id, constants::DW_AT_artificial))
        };
        if name.is_empty() && linkage.is_none() {
            return None;
        }
        let _ = is_artificial;

        let qualified = names::die_qualified_name(&self.dwarf, (source, id));
        if self.suppressed.contains(&qualified) {
            return None;
        }

        let fn_type = self.build_function_type(source, id, None);
        self.die_types.insert((source, offset), fn_type);
        self.late_canon.push((source, id));

        let mut symbol =
            self.bind_function_symbol(address, linkage.as_ref().map(|s| &s[..]));
        if symbol.is_none() && linkage.is_none() {
            // C functions carry no linkage name distinct from their
            // plain name.
            symbol = self.corpus
                .symtab
                .defined_function_symbols()
                .get(&name)
                .cloned();
        }
        // The symbol lends its name as the linkage name when the DIE
        // stated none.
        let linkage = linkage.or_else(|| {
            symbol.map(|s| self.corpus.symtab.symbol(s).name.clone())
        });

        let scope = self.scope_for_die(source, id);
        let name_istr = self.env.intern(&name);
        let linkage_istr = linkage.map(|l| self.env.intern(&l));
        let decl = self.env.add_decl(Decl {
            kind: DeclKind::Function(FunctionDecl {
                name: name_istr,
                linkage_name: linkage_istr,
                signature: fn_type,
                symbol: symbol,
                address: address,
                access: None,
                is_static: false,
                is_ctor: false,
                is_dtor: false,
                virtuality: Virtuality::None,
                vtable_index: None,
            }),
            scope: scope,
        });
        self.die_decls.insert((source, offset), decl);
        self.stats.decls_built += 1;
        Some(decl)
    }

    fn build_variable_decl(&mut self, source: DieSource, id: DieId) -> Option<DeclId> {
        let offset = self.dwarf.info(source)?.die(id).offset();
        if let Some(&existing) = self.die_decls.get(&(source, offset)) {
            return Some(existing);
        }

        let (location, address, is_tls) = {
            let info = self.dwarf.info(source)?;
            match info.expression(id, constants::DW_AT_location) {
                Some(bytes) => {
                    let result =
                        expr::variable_address(EndianBuf::<Endian>::new(bytes),
                                               info.unit_of(id).address_size());
                    (true, result.value, result.is_tls_address)
                }
                None => (false, None, false),
            }
        };
        let _ = location;

        // A variable cloning an in-class declaration is that class's
        // static member; thread the address and symbol onto it.
        if let Some((origin_source, origin_id)) = self.origin_target(source, id) {
            let origin_offset = self.dwarf.info(origin_source)?.die(origin_id).offset();
            if self.die_decls.get(&(origin_source, origin_offset)).is_none() {
                if let Some((psource, pid)) =
                    self.dwarf.logical_parent((origin_source, origin_id)) {
                    let parent_tag = self.dwarf.info(psource)?.die(pid).tag();
                    if parent_tag.is_class_or_union_tag() {
                        self.type_of_die(psource, pid);
                    }
                }
            }
            if let Some(&origin_decl) =
                self.die_decls.get(&(origin_source, origin_offset)) {
                let symbol = address.and_then(|a| self.symbol_for_address(a));
                if let DeclKind::Variable(ref mut v) =
                    self.env.decl_mut(origin_decl).kind {
                    v.is_static_member = true;
                    if v.address.is_none() {
                        v.address = address;
                    }
                    v.is_tls = v.is_tls || is_tls;
                    if v.symbol.is_none() {
                        v.symbol = symbol;
                    }
                }
                self.die_decls.insert((source, offset), origin_decl);
                return Some(origin_decl);
            }
        }

        let (name, linkage) = {
            let info = self.dwarf.info(source)?;
            (info.name(id).unwrap_or("").to_string(),
             info.linkage_name(id).map(|s| s.to_string()))
        };
        if name.is_empty() && linkage.is_none() {
            return None;
        }

        let qualified = names::die_qualified_name(&self.dwarf, (source, id));
        if self.suppressed.contains(&qualified) {
            return None;
        }

        let var_type = self.resolved_type_of(source, id, constants::DW_AT_type)
            .unwrap_or_else(|| self.env.void_type());

        let mut symbol = address.and_then(|a| self.symbol_for_address(a));
        if symbol.is_none() {
            let by_name = linkage.as_ref().unwrap_or(&name);
            symbol = self.corpus
                .symtab
                .defined_variable_symbols()
                .get(by_name)
                .cloned();
        }
        let linkage = linkage.or_else(|| {
            symbol.map(|s| self.corpus.symtab.symbol(s).name.clone())
        });

        let scope = self.scope_for_die(source, id);
        let name_istr = self.env.intern(&name);
        let linkage_istr = linkage.map(|l| self.env.intern(&l));
        let decl = self.env.add_decl(Decl {
            kind: DeclKind::Variable(VariableDecl {
                name: name_istr,
                linkage_name: linkage_istr,
                var_type: var_type,
                symbol: symbol,
                address: address,
                is_tls: is_tls,
                is_static_member: false,
                access: None,
            }),
            scope: scope,
        });
        self.die_decls.insert((source, offset), decl);
        self.stats.decls_built += 1;
        Some(decl)
    }

    // ----- scopes -----

    /// The scope a DIE's IR node belongs to, walking logical parents
    /// with imported units resolved. A type mis-nested under a
    /// subprogram is reparented past any class bodies to the nearest
    /// namespace or global scope.
    fn scope_for_die(&mut self, source: DieSource, id: DieId) -> ScopeId {
        let mut crossed_function = false;
        let mut current = self.dwarf.logical_parent((source, id));

        while let Some((psource, pid)) = current {
            let tag = match self.dwarf.info(psource) {
                Some(info) => info.die(pid).tag(),
                None => break,
            };
            match tag {
                constants::DW_TAG_subprogram |
                constants::DW_TAG_inlined_subroutine |
                constants::DW_TAG_lexical_block => {
                    crossed_function = true;
                }
                constants::DW_TAG_namespace |
                constants::DW_TAG_module => {
                    return self.namespace_scope(psource, pid);
                }
                constants::DW_TAG_class_type |
                constants::DW_TAG_structure_type |
                constants::DW_TAG_union_type => {
                    if !crossed_function {
                        let offset = self.dwarf
                            .info(psource)
                            .expect("just read the tag")
                            .die(pid)
                            .offset();
                        if let Some(&scope) = self.class_scopes.get(&(psource, offset)) {
                            return scope;
                        }
                        self.type_of_die(psource, pid);
                        if let Some(&scope) = self.class_scopes.get(&(psource, offset)) {
                            return scope;
                        }
                    }
                    // Mis-nested under a function: skip the class and
                    // keep walking outward.
                }
                constants::DW_TAG_compile_unit |
                constants::DW_TAG_partial_unit |
                constants::DW_TAG_type_unit => break,
                _ => {}
            }
            current = self.dwarf.logical_parent((psource, pid));
        }

        self.tu_global_scope(source, id)
    }

    /// One scope per qualified namespace name per translation unit.
    fn namespace_scope(&mut self, source: DieSource, id: DieId) -> ScopeId {
        let qualified = names::die_qualified_name(&self.dwarf, (source, id));
        let tu = self.tu_of_die(source, id);
        if let Some(&scope) = self.namespace_scopes.get(&(tu, qualified.clone())) {
            return scope;
        }
        let parent = self.scope_for_die(source, id);
        let name = {
            let info = self.dwarf.info(source);
            info.and_then(|i| i.name(id)).unwrap_or("").to_string()
        };
        let istr = self.env.intern(&name);
        let scope = self.env.add_scope(ScopeKind::Namespace(istr), Some(parent));
        self.namespace_scopes.insert((tu, qualified), scope);
        scope
    }

    fn tu_of_die(&self, source: DieSource, id: DieId) -> usize {
        if source == DieSource::Primary {
            if let Some(info) = self.dwarf.info(source) {
                let unit_offset = info.unit_of(id).offset();
                if let Some(&tu) = self.unit_tu.get(&unit_offset) {
                    return tu;
                }
            }
        }
        self.cur_tu
    }

    fn tu_global_scope(&mut self, source: DieSource, id: DieId) -> ScopeId {
        let tu = self.tu_of_die(source, id);
        if tu < self.corpus.translation_units().len() {
            return self.corpus.translation_unit(tu).global_scope();
        }
        // A reference reached a unit before its TU exists; park the
        // node in the current unit's global scope.
        self.corpus.translation_unit(self.cur_tu).global_scope()
    }

    // ----- fixup passes -----

    /// Resolve outstanding forward declarations against definitions
    /// of the same qualified name: the same translation unit wins,
    /// else a unique definition across units.
    fn resolve_declaration_only_classes(&mut self) {
        let worklist = ::std::mem::replace(&mut self.decl_only_classes, Vec::new());
        for (ty, tu, qualified) in worklist {
            let definition = match self.class_definitions.get(&qualified) {
                Some(defs) => {
                    defs.iter()
                        .find(|&&(_, def_tu)| def_tu == tu)
                        .map(|&(def, _)| def)
                        .or_else(|| {
                            let unique: Vec<TypeId> =
                                defs.iter().map(|&(def, _)| def).collect();
                            if unique.len() == 1 {
                                Some(unique[0])
                            } else {
                                None
                            }
                        })
                }
                None => None,
            };
            if let Some(definition) = definition {
                if let TypeKind::Class(ref mut class) = self.env.type_mut(ty).kind {
                    class.definition = Some(definition);
                }
            }
        }
    }

    /// Attach symbols to virtual methods whose linkage name was seen
    /// without a symbol during the build pass.
    fn fixup_virtual_method_symbols(&mut self) {
        let worklist = ::std::mem::replace(&mut self.method_symbol_fixups, Vec::new());
        for decl in worklist {
            let linkage = match self.env.decl(decl).linkage_name() {
                Some(linkage) => self.env.str(linkage).to_string(),
                None => continue,
            };
            let symbol = self.corpus
                .symtab
                .defined_function_symbols()
                .get(&linkage)
                .cloned();
            if let Some(symbol) = symbol {
                if let DeclKind::Function(ref mut f) = self.env.decl_mut(decl).kind {
                    if f.symbol.is_none() {
                        f.symbol = Some(symbol);
                    }
                }
            }
        }
    }

    /// Canonicalize every DIE scheduled during the build, then every
    /// type constructed outside the DIE association path.
    fn late_canonicalize(&mut self) {
        let worklist = ::std::mem::replace(&mut self.late_canon, Vec::new());
        for (source, id) in worklist {
            let canon_offset = {
                let dwarf = &self.dwarf;
                let cache = self.caches.for_source(source);
                cache.lookup_or_canonicalize(dwarf, id).offset()
            };
            let offset = match self.dwarf.info(source) {
                Some(info) => info.die(id).offset(),
                None => continue,
            };
            let ty = match self.die_types.get(&(source, offset)) {
                Some(&ty) => ty,
                None => continue,
            };
            let canon_ty = self.die_types
                .get(&(source, canon_offset))
                .cloned()
                .unwrap_or(ty);
            self.env.set_canonical(ty, canon_ty);
            self.stats.dies_canonicalized += 1;
        }

        // Types with no DIE of their own (synthesized underlying
        // types, the shells behind suppressed ones) become their own
        // representatives.
        for index in self.first_new_type..self.env.type_count() {
            let ty = TypeId::from_index(index);
            if self.env.type_(ty).canonical().is_none() {
                self.env.set_canonical(ty, ty);
                self.stats.extra_types_canonicalized += 1;
            }
        }
    }

    /// Fill the corpus's exported views and sort them for
    /// deterministic downstream serialization.
    fn collect_exported_decls(&mut self) {
        let kernel = self.options.load_in_linux_kernel_mode;
        let mut functions = Vec::new();
        let mut variables = Vec::new();

        for index in self.first_new_decl..self.env.decl_count() {
            let decl = DeclId::from_index(index);
            let symbol = match self.env.decl(decl).symbol() {
                Some(symbol) => symbol,
                None => continue,
            };
            if !self.corpus.symtab.is_exported(symbol, kernel) {
                continue;
            }
            match self.env.decl(decl).kind {
                DeclKind::Function(_) => functions.push(decl),
                DeclKind::Variable(_) => variables.push(decl),
            }
        }

        let env = &*self.env;
        functions.sort_by_key(|&d| {
            (env.decl_qualified_name(d),
             env.decl(d).linkage_name().map(|l| env.str(l).to_string()))
        });
        variables.sort_by_key(|&d| {
            (env.decl_qualified_name(d),
             env.decl(d).linkage_name().map(|l| env.str(l).to_string()))
        });

        self.corpus.exported_functions = functions;
        self.corpus.exported_variables = variables;
    }
}

/// Read a corpus from DWARF section bytes and a pre-built symbol
/// database. This is the section-level entry used by tests and by
/// callers that already hold the bytes.
pub fn read_corpus_from_sections<'input, Endian>(env: &mut Environment,
                                                 path: &str,
                                                 sections: DwarfSections<'input, Endian>,
                                                 symtab: SymbolTable,
                                                 options: &ReadOptions)
                                                 -> Result<Corpus>
    where Endian: Endianity
{
    let dwarf = Dwarf::parse(sections, None)?;
    let corpus = Corpus::new(path.to_string(), String::new(), symtab);
    ReadContext::new(env, dwarf, None, options.clone(), corpus).read()
}

/// Read a corpus from an ELF file on disk.
pub fn read_corpus_from_elf(path: &Path,
                            env: &mut Environment,
                            options: &ReadOptions)
                            -> Result<Corpus> {
    let file = fs::File::open(path)?;
    let map = unsafe { Mmap::map(&file) }?;
    let (_, big_endian) = elf::elf_ident(&map)?;
    if big_endian {
        read_elf_bytes::<BigEndian>(path, &map, env, options)
    } else {
        read_elf_bytes::<LittleEndian>(path, &map, env, options)
    }
}

fn read_elf_bytes<Endian>(path: &Path,
                          bytes: &[u8],
                          env: &mut Environment,
                          options: &ReadOptions)
                          -> Result<Corpus>
    where Endian: Endianity
{
    let elf = ElfFile::<Endian>::parse(EndianBuf::new(bytes))?;
    let mut status = ReadStatus::empty();

    // The alternate debug-info file, when the binary links one.
    let alt_bytes = match locate_alt_debug_info(&elf, path, options) {
        AltDebugInfo::None => None,
        AltDebugInfo::Found(bytes) => Some(bytes),
        AltDebugInfo::Missing => {
            status |= ReadStatus::ALT_DEBUG_INFO_NOT_FOUND;
            None
        }
    };
    let alt_elf = alt_bytes
        .as_ref()
        .and_then(|bytes| ElfFile::<Endian>::parse(EndianBuf::new(bytes)).ok());

    // Symbols.
    let mut symtab = SymbolTable::default();
    if !options.ignore_symbol_table {
        match SymbolTable::load(&elf) {
            Ok(table) => symtab = table,
            Err(Error::NoSymbolsFound) => status |= ReadStatus::NO_SYMBOLS_FOUND,
            Err(e) => return Err(e),
        }
        if options.load_in_linux_kernel_mode {
            symtab.load_ksymtab(&elf)?;
        }
    }

    let mut corpus = Corpus::new(path.to_string_lossy().into_owned(),
                                 elf.architecture(),
                                 symtab);
    corpus.soname = elf.soname().map(|s| s.to_string());
    corpus.needed = elf.needed().iter().map(|s| s.to_string()).collect();
    corpus.status = status;

    let primary = match dwarf_sections_of(&elf) {
        Some(sections) => sections,
        None => {
            // Still a corpus: the symbol views stand on their own.
            corpus.status |= ReadStatus::DEBUG_INFO_NOT_FOUND;
            return Ok(corpus);
        }
    };
    let alternate = alt_elf.as_ref().and_then(|alt| dwarf_sections_of(alt));

    let dwarf = Dwarf::parse(primary, alternate)?;
    ReadContext::new(env, dwarf, Some(elf), options.clone(), corpus).read()
}

fn dwarf_sections_of<'input, 'a, Endian>(elf: &'a ElfFile<'input, Endian>)
                                         -> Option<DwarfSections<'input, Endian>>
    where Endian: Endianity
{
    let debug_info = elf.section_by_name(".debug_info")?;
    let debug_abbrev = elf.section_by_name(".debug_abbrev")?;
    let debug_str = elf.section_by_name(".debug_str");
    let debug_types = elf.section_by_name(".debug_types");

    let mut sections =
        DwarfSections::new(elf.section_data(debug_info),
                           elf.section_data(debug_abbrev),
                           debug_str
                               .map(|s| elf.section_data(s))
                               .unwrap_or_else(|| elf.section_data(debug_info)
                                   .range_to(..0)));
    sections.debug_types = debug_types.map(|s| elf.section_data(s));
    Some(sections)
}

enum AltDebugInfo {
    None,
    Found(Vec<u8>),
    Missing,
}

/// Follow `.gnu_debugaltlink`: the section holds a file name and the
/// build id of the wanted file. The name is tried next to the binary
/// and under every configured debug-info root path.
fn locate_alt_debug_info<'input, Endian>(elf: &ElfFile<'input, Endian>,
                                         binary_path: &Path,
                                         options: &ReadOptions)
                                         -> AltDebugInfo
    where Endian: Endianity
{
    let section = match elf.section_by_name(".gnu_debugaltlink") {
        Some(section) => section,
        None => return AltDebugInfo::None,
    };
    let data = elf.section_data(section);
    let name_end = match data.iter().position(|&b| b == 0) {
        Some(end) => end,
        None => return AltDebugInfo::Missing,
    };
    let name_buf = data.range_to(..name_end);
    let name = match ::std::str::from_utf8(&name_buf) {
        Ok(name) => name,
        Err(_) => return AltDebugInfo::Missing,
    };

    let mut candidates = Vec::new();
    if let Some(dir) = binary_path.parent() {
        candidates.push(dir.join(name));
    }
    for root in &options.debug_info_root_paths {
        candidates.push(root.join(name.trim_start_matches('/')));
    }
    for candidate in candidates {
        if let Ok(bytes) = fs::read(&candidate) {
            return AltDebugInfo::Found(bytes);
        }
    }
    AltDebugInfo::Missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;
    use dwarf::DwarfSections;
    use elf::{ElfFile, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STT_FUNC, STT_OBJECT};
    use endianity::{EndianBuf, LittleEndian};
    use ir::{Environment, ScopeId, TypeId, TypeKind, DeclKind};
    use symbols::SymbolTable;
    use test_util::{TestAttr, TestDie, TestDwarf, TestElf, TestSection, emit_sym64};

    fn read(test: &TestDwarf,
            env: &mut Environment,
            symtab: SymbolTable,
            options: &ReadOptions)
            -> Corpus {
        read_corpus_from_sections(env,
                                  "test-binary",
                                  DwarfSections::new(EndianBuf::<LittleEndian>::new(test.debug_info()),
                                                     EndianBuf::new(test.debug_abbrev()),
                                                     EndianBuf::new(test.debug_str())),
                                  symtab,
                                  options)
            .expect("should read")
    }

    fn scope_types(env: &Environment, scope: ScopeId) -> Vec<TypeId> {
        env.scope(scope).types.clone()
    }

    fn find_class(env: &Environment, scope: ScopeId, name: &str) -> Option<TypeId> {
        scope_types(env, scope).into_iter().find(|&t| {
            match env.type_(t).kind {
                TypeKind::Class(ref c) => {
                    c.name.map(|n| env.str(n) == name).unwrap_or(false)
                }
                _ => false,
            }
        })
    }

    fn find_function(env: &Environment, scope: ScopeId, name: &str) -> Option<DeclId> {
        env.scope(scope).decls.iter().cloned().find(|&d| {
            match env.decl(d).kind {
                DeclKind::Function(_) => env.str(env.decl(d).name()) == name,
                _ => false,
            }
        })
    }

    fn struct_s_and_f(file: &'static str,
                      labels: (&'static str, &'static str, &'static str))
                      -> TestDie {
        let (int_label, s_label, ptr_label) = labels;
        TestDie::new(DW_TAG_compile_unit)
            .attr(DW_AT_name, TestAttr::Str(file))
            .child(TestDie::new(DW_TAG_base_type)
                .label(int_label)
                .attr(DW_AT_name, TestAttr::Str("int"))
                .attr(DW_AT_byte_size, TestAttr::Data1(4)))
            .child(TestDie::new(DW_TAG_structure_type)
                .label(s_label)
                .attr(DW_AT_name, TestAttr::Str("S"))
                .attr(DW_AT_byte_size, TestAttr::Data1(8))
                .child(TestDie::new(DW_TAG_member)
                    .attr(DW_AT_name, TestAttr::Str("a"))
                    .attr(DW_AT_type, TestAttr::Ref(int_label))
                    .attr(DW_AT_data_member_location, TestAttr::Data1(0)))
                .child(TestDie::new(DW_TAG_member)
                    .attr(DW_AT_name, TestAttr::Str("b"))
                    .attr(DW_AT_type, TestAttr::Ref(int_label))
                    .attr(DW_AT_data_member_location, TestAttr::Data1(4))))
            .child(TestDie::new(DW_TAG_pointer_type)
                .label(ptr_label)
                .attr(DW_AT_type, TestAttr::Ref(s_label)))
            .child(TestDie::new(DW_TAG_subprogram)
                .attr(DW_AT_name, TestAttr::Str("f"))
                .attr(DW_AT_external, TestAttr::Flag(true))
                .child(TestDie::new(DW_TAG_formal_parameter)
                    .attr(DW_AT_type, TestAttr::Ref(ptr_label))))
    }

    #[test]
    fn test_struct_and_function() {
        // One CU: struct S { int a; int b; }; void f(struct S*);
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, struct_s_and_f("t.c", ("i", "s", "p")));
        let test = test.build();

        let mut env = Environment::new();
        let corpus = read(&test,
                          &mut env,
                          SymbolTable::default(),
                          &ReadOptions::default());

        assert_eq!(corpus.translation_units().len(), 1);
        let tu = &corpus.translation_units()[0];
        assert_eq!(tu.path(), "t.c");
        let global = tu.global_scope();

        let s = find_class(&env, global, "S").expect("struct S");
        match env.type_(s).kind {
            TypeKind::Class(ref class) => {
                assert_eq!(class.size_bits, 64);
                assert_eq!(class.members.len(), 2);
                assert_eq!(env.str(class.members[0].name), "a");
                assert_eq!(class.members[0].offset_bits, Some(0));
                assert_eq!(env.str(class.members[1].name), "b");
                assert_eq!(class.members[1].offset_bits, Some(32));
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }

        let f = find_function(&env, global, "f").expect("function f");
        let signature = match env.decl(f).kind {
            DeclKind::Function(ref decl) => decl.signature,
            ref otherwise => panic!("Unexpected decl: {:?}", otherwise),
        };
        match env.type_(signature).kind {
            TypeKind::Function(ref fn_type) => {
                // void return; one parameter: pointer to S.
                assert!(fn_type.return_type.is_none());
                assert_eq!(fn_type.parameters.len(), 1);
                let param = fn_type.parameters[0].param_type;
                match env.type_(param).kind {
                    TypeKind::Pointer { pointee, .. } => {
                        assert!(env.types_equal(pointee, s));
                    }
                    ref otherwise => panic!("Unexpected type: {:?}", otherwise),
                }
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }

    #[test]
    fn test_equal_structs_share_canonical_identity() {
        // Two CUs with identical struct S: one canonical
        // representative, shared pointer identity.
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, struct_s_and_f("a.c", ("i1", "s1", "p1")));
        test.compile_unit(DW_LANG_C99, struct_s_and_f("b.c", ("i2", "s2", "p2")));
        let test = test.build();

        let mut env = Environment::new();
        let corpus = read(&test,
                          &mut env,
                          SymbolTable::default(),
                          &ReadOptions::default());

        assert_eq!(corpus.translation_units().len(), 2);
        let s1 = find_class(&env,
                            corpus.translation_units()[0].global_scope(),
                            "S")
            .expect("S in first unit");
        let s2 = find_class(&env,
                            corpus.translation_units()[1].global_scope(),
                            "S")
            .expect("S in second unit");

        assert!(s1 != s2);
        assert!(env.types_equal(s1, s2));
        assert_eq!(env.canonical_type(s1), env.canonical_type(s2));

        // The two parameter-type pointers share canonical identity
        // too.
        let pointers: Vec<TypeId> = (0..env.type_count())
            .map(TypeId::from_index)
            .filter(|&t| match env.type_(t).kind {
                TypeKind::Pointer { pointee, .. } => {
                    env.types_equal(pointee, s1)
                }
                _ => false,
            })
            .collect();
        assert_eq!(pointers.len(), 2);
        assert!(env.types_equal(pointers[0], pointers[1]));
    }

    #[test]
    fn test_self_referential_struct_terminates() {
        // struct Node { struct Node* next; };
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("n.c"))
                              .child(TestDie::new(DW_TAG_structure_type)
                                  .label("node")
                                  .attr(DW_AT_name, TestAttr::Str("Node"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(8))
                                  .child(TestDie::new(DW_TAG_member)
                                      .attr(DW_AT_name, TestAttr::Str("next"))
                                      .attr(DW_AT_type, TestAttr::Ref("nodeptr"))
                                      .attr(DW_AT_data_member_location,
                                            TestAttr::Data1(0))))
                              .child(TestDie::new(DW_TAG_pointer_type)
                                  .label("nodeptr")
                                  .attr(DW_AT_type, TestAttr::Ref("node"))));
        let test = test.build();

        let mut env = Environment::new();
        let mut options = ReadOptions::default();
        options.load_all_types = true;
        let corpus = read(&test, &mut env, SymbolTable::default(), &options);

        let global = corpus.translation_units()[0].global_scope();
        let node = find_class(&env, global, "Node").expect("Node");
        let member_type = match env.type_(node).kind {
            TypeKind::Class(ref class) => {
                assert_eq!(class.members.len(), 1);
                class.members[0].mem_type
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        };
        match env.type_(member_type).kind {
            TypeKind::Pointer { pointee, .. } => {
                // The cycle resolved to the struct itself.
                assert_eq!(pointee, node);
                assert_eq!(env.canonical_type(pointee), env.canonical_type(node));
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }

    #[test]
    fn test_translation_units_merge_by_path() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("/src/one.c")));
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("/src/one.c")));
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("/src/two.c")));
        let test = test.build();

        let mut env = Environment::new();
        let corpus = read(&test,
                          &mut env,
                          SymbolTable::default(),
                          &ReadOptions::default());
        assert_eq!(corpus.translation_units().len(), 2);
    }

    #[test]
    fn test_cv_normalization_is_idempotent() {
        // Two const DIEs over one array: the first re-seats const on
        // the element, the second finds it already there.
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("c.c"))
                              .child(TestDie::new(DW_TAG_base_type)
                                  .label("int")
                                  .attr(DW_AT_name, TestAttr::Str("int"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(4)))
                              .child(TestDie::new(DW_TAG_array_type)
                                  .label("arr")
                                  .attr(DW_AT_type, TestAttr::Ref("int"))
                                  .child(TestDie::new(DW_TAG_subrange_type)
                                      .attr(DW_AT_upper_bound, TestAttr::Data1(9))))
                              .child(TestDie::new(DW_TAG_const_type)
                                  .attr(DW_AT_type, TestAttr::Ref("arr")))
                              .child(TestDie::new(DW_TAG_const_type)
                                  .attr(DW_AT_type, TestAttr::Ref("arr"))));
        let test = test.build();

        let mut env = Environment::new();
        let mut options = ReadOptions::default();
        options.load_all_types = true;
        let corpus = read(&test, &mut env, SymbolTable::default(), &options);
        let _ = corpus;

        let arrays: Vec<TypeId> = (0..env.type_count())
            .map(TypeId::from_index)
            .filter(|&t| match env.type_(t).kind {
                TypeKind::Array { .. } => true,
                _ => false,
            })
            .collect();
        assert_eq!(arrays.len(), 1);

        // The array's element is const int, qualified exactly once.
        match env.type_(arrays[0]).kind {
            TypeKind::Array { element, .. } => {
                match env.type_(element).kind {
                    TypeKind::Qualified { underlying, quals } => {
                        assert_eq!(quals, ::ir::Qualifiers::CONST);
                        match env.type_(underlying).kind {
                            TypeKind::Base { name, .. } => {
                                assert_eq!(env.str(name), "int")
                            }
                            ref otherwise => {
                                panic!("Unexpected type: {:?}", otherwise)
                            }
                        }
                    }
                    ref otherwise => panic!("Unexpected type: {:?}", otherwise),
                }
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }

    #[test]
    fn test_const_reference_collapses() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C_plus_plus,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("r.cc"))
                              .child(TestDie::new(DW_TAG_base_type)
                                  .label("int")
                                  .attr(DW_AT_name, TestAttr::Str("int"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(4)))
                              .child(TestDie::new(DW_TAG_reference_type)
                                  .label("ref")
                                  .attr(DW_AT_type, TestAttr::Ref("int")))
                              .child(TestDie::new(DW_TAG_const_type)
                                  .attr(DW_AT_type, TestAttr::Ref("ref"))));
        let test = test.build();

        let mut env = Environment::new();
        let mut options = ReadOptions::default();
        options.load_all_types = true;
        read(&test, &mut env, SymbolTable::default(), &options);

        // No Qualified node was created at all: const& is &.
        let qualified_count = (0..env.type_count())
            .map(TypeId::from_index)
            .filter(|&t| match env.type_(t).kind {
                TypeKind::Qualified { .. } => true,
                _ => false,
            })
            .count();
        assert_eq!(qualified_count, 0);
    }

    #[test]
    fn test_declaration_only_class_resolution() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("fwd.c"))
                              .child(TestDie::new(DW_TAG_structure_type)
                                  .attr(DW_AT_name, TestAttr::Str("S"))
                                  .attr(DW_AT_declaration, TestAttr::Flag(true))));
        test.compile_unit(DW_LANG_C99, struct_s_and_f("def.c", ("i", "s", "p")));
        let test = test.build();

        let mut env = Environment::new();
        let mut options = ReadOptions::default();
        options.load_all_types = true;
        let corpus = read(&test, &mut env, SymbolTable::default(), &options);

        let fwd_scope = corpus.translation_units()[0].global_scope();
        let def_scope = corpus.translation_units()[1].global_scope();
        let fwd = find_class(&env, fwd_scope, "S").expect("forward S");
        let def = find_class(&env, def_scope, "S").expect("defined S");

        match env.type_(fwd).kind {
            TypeKind::Class(ref class) => {
                assert!(class.is_declaration_only);
                assert_eq!(class.definition, Some(def));
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }

    #[test]
    fn test_suppressed_type_is_opaque() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99, struct_s_and_f("t.c", ("i", "s", "p")));
        let test = test.build();

        let mut env = Environment::new();
        let dwarf = Dwarf::parse(DwarfSections::new(EndianBuf::<LittleEndian>::new(test.debug_info()),
                                                    EndianBuf::new(test.debug_abbrev()),
                                                    EndianBuf::new(test.debug_str())),
                                 None)
            .expect("should parse");
        let corpus = Corpus::new("t".to_string(),
                                 String::new(),
                                 SymbolTable::default());
        let mut ctx = ReadContext::new(&mut env,
                                       dwarf,
                                       None,
                                       ReadOptions::default(),
                                       corpus);
        ctx.suppress_type_name("S");
        let corpus = ctx.read().expect("should read");

        let global = corpus.translation_units()[0].global_scope();
        let s = find_class(&env, global, "S").expect("S shell");
        match env.type_(s).kind {
            TypeKind::Class(ref class) => {
                assert!(class.is_declaration_only);
                assert!(class.members.is_empty());
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }

    fn symtab_with(entries: &[(&'static str, u8, u64)]) -> SymbolTable {
        let mut strtab = vec![0u8];
        let mut syms = Vec::new();
        emit_sym64(&mut syms, 0, 0, 0, 0, 0, 0);
        for &(name, sym_type, value) in entries {
            let name_offset = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            emit_sym64(&mut syms,
                       name_offset,
                       (STB_GLOBAL << 4) | sym_type,
                       0,
                       1,
                       value,
                       0);
        }
        let mut elf = TestElf::new();
        let strtab_idx = elf.section(TestSection::new(".strtab", SHT_STRTAB, strtab));
        elf.section(TestSection::new(".symtab", SHT_SYMTAB, syms)
            .link(strtab_idx)
            .entsize(24));
        let image = elf.build();
        let file = ElfFile::<LittleEndian>::parse(EndianBuf::new(&image)).unwrap();
        SymbolTable::load(&file).unwrap()
    }

    #[test]
    fn test_function_symbol_binding_and_export() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("t.c"))
                              .child(TestDie::new(DW_TAG_subprogram)
                                  .attr(DW_AT_name, TestAttr::Str("f"))
                                  .attr(DW_AT_external, TestAttr::Flag(true))
                                  .attr(DW_AT_low_pc, TestAttr::Addr(0x1000)))
                              .child(TestDie::new(DW_TAG_variable)
                                  .attr(DW_AT_name, TestAttr::Str("v"))
                                  .attr(DW_AT_external, TestAttr::Flag(true))
                                  .attr(DW_AT_location,
                                        TestAttr::Expr(vec![DW_OP_addr.0,
                                                            0x00, 0x20, 0, 0,
                                                            0, 0, 0, 0]))));
        let test = test.build();

        let symtab = symtab_with(&[("f", STT_FUNC, 0x1000),
                                   ("v", STT_OBJECT, 0x2000)]);
        let mut env = Environment::new();
        let corpus = read(&test, &mut env, symtab, &ReadOptions::default());

        assert_eq!(corpus.exported_functions.len(), 1);
        assert_eq!(corpus.exported_variables.len(), 1);

        let f = corpus.exported_functions[0];
        let symbol = env.decl(f).symbol().expect("f is bound");
        assert_eq!(corpus.symtab.symbol(symbol).name, "f");
        // The symbol lends the linkage name the DIE did not state.
        let linkage = env.decl(f).linkage_name().expect("linkage name");
        assert!(corpus.symtab.alias_names(symbol).contains(&env.str(linkage)));

        let v = corpus.exported_variables[0];
        match env.decl(v).kind {
            DeclKind::Variable(ref var) => {
                assert_eq!(var.address, Some(0x2000));
                assert!(!var.is_tls);
            }
            ref otherwise => panic!("Unexpected decl: {:?}", otherwise),
        }
    }

    #[test]
    fn test_virtual_method_symbol_fixup() {
        // A virtual method with a linkage name but no address: the
        // symbol is attached by the post-build fixup.
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C_plus_plus,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("c.cc"))
                              .child(TestDie::new(DW_TAG_class_type)
                                  .label("C")
                                  .attr(DW_AT_name, TestAttr::Str("C"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(8))
                                  .child(TestDie::new(DW_TAG_subprogram)
                                      .attr(DW_AT_name, TestAttr::Str("m"))
                                      .attr(DW_AT_linkage_name,
                                            TestAttr::Str("_ZN1C1mEv"))
                                      .attr(DW_AT_virtuality,
                                            TestAttr::Data1(DW_VIRTUALITY_virtual.0 as u8))
                                      .attr(DW_AT_vtable_elem_location,
                                            TestAttr::Expr(vec![DW_OP_constu.0, 2])))));
        let test = test.build();

        let symtab = symtab_with(&[("_ZN1C1mEv", STT_FUNC, 0x4000)]);
        let mut env = Environment::new();
        let mut options = ReadOptions::default();
        options.load_all_types = true;
        let corpus = read(&test, &mut env, symtab, &options);

        let global = corpus.translation_units()[0].global_scope();
        let class = find_class(&env, global, "C").expect("class C");
        let method = match env.type_(class).kind {
            TypeKind::Class(ref c) => {
                assert_eq!(c.methods.len(), 1);
                c.methods[0]
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        };
        match env.decl(method).kind {
            DeclKind::Function(ref f) => {
                assert_eq!(f.virtuality, Virtuality::Virtual);
                assert_eq!(f.vtable_index, Some(2));
                let symbol = f.symbol.expect("fixed up");
                assert_eq!(corpus.symtab.symbol(symbol).name, "_ZN1C1mEv");
            }
            ref otherwise => panic!("Unexpected decl: {:?}", otherwise),
        }
    }

    #[test]
    fn test_namespace_scoping() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C_plus_plus,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("ns.cc"))
                              .child(TestDie::new(DW_TAG_namespace)
                                  .attr(DW_AT_name, TestAttr::Str("net"))
                                  .child(TestDie::new(DW_TAG_subprogram)
                                      .attr(DW_AT_name, TestAttr::Str("connect"))
                                      .attr(DW_AT_external, TestAttr::Flag(true)))));
        let test = test.build();

        let mut env = Environment::new();
        read(&test, &mut env, SymbolTable::default(), &ReadOptions::default());

        let decls: Vec<String> = (0..env.decl_count())
            .map(DeclId::from_index)
            .map(|d| env.decl_qualified_name(d))
            .collect();
        assert!(decls.contains(&"net::connect".to_string()),
                "found decls: {:?}",
                decls);
    }

    #[test]
    fn test_enum_and_underlying_type() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("e.c"))
                              .child(TestDie::new(DW_TAG_enumeration_type)
                                  .attr(DW_AT_name, TestAttr::Str("E"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(4))
                                  .child(TestDie::new(DW_TAG_enumerator)
                                      .attr(DW_AT_name, TestAttr::Str("A"))
                                      .attr(DW_AT_const_value, TestAttr::Sdata(0)))
                                  .child(TestDie::new(DW_TAG_enumerator)
                                      .attr(DW_AT_name, TestAttr::Str("B"))
                                      .attr(DW_AT_const_value, TestAttr::Sdata(-1)))));
        let test = test.build();

        let mut env = Environment::new();
        let mut options = ReadOptions::default();
        options.load_all_types = true;
        let corpus = read(&test, &mut env, SymbolTable::default(), &options);

        let global = corpus.translation_units()[0].global_scope();
        let e = scope_types(&env, global)
            .into_iter()
            .find(|&t| match env.type_(t).kind {
                TypeKind::Enum(_) => true,
                _ => false,
            })
            .expect("enum E");
        match env.type_(e).kind {
            TypeKind::Enum(ref en) => {
                assert_eq!(en.size_bits, 32);
                assert_eq!(en.enumerators.len(), 2);
                assert_eq!(env.str(en.enumerators[1].name), "B");
                assert_eq!(en.enumerators[1].value, -1);
                match env.type_(en.underlying).kind {
                    TypeKind::Base { name, size_bits } => {
                        assert_eq!(env.str(name), "unnamed-enum-underlying-type");
                        assert_eq!(size_bits, 32);
                    }
                    ref otherwise => panic!("Unexpected type: {:?}", otherwise),
                }
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }

    #[test]
    fn test_variadic_function() {
        let mut test = TestDwarf::new();
        test.compile_unit(DW_LANG_C99,
                          TestDie::new(DW_TAG_compile_unit)
                              .attr(DW_AT_name, TestAttr::Str("v.c"))
                              .child(TestDie::new(DW_TAG_base_type)
                                  .label("int")
                                  .attr(DW_AT_name, TestAttr::Str("int"))
                                  .attr(DW_AT_byte_size, TestAttr::Data1(4)))
                              .child(TestDie::new(DW_TAG_subprogram)
                                  .attr(DW_AT_name, TestAttr::Str("logf"))
                                  .attr(DW_AT_type, TestAttr::Ref("int"))
                                  .child(TestDie::new(DW_TAG_formal_parameter)
                                      .attr(DW_AT_type, TestAttr::Ref("int")))
                                  .child(TestDie::new(DW_TAG_unspecified_parameters))));
        let test = test.build();

        let mut env = Environment::new();
        let corpus = read(&test,
                          &mut env,
                          SymbolTable::default(),
                          &ReadOptions::default());

        let global = corpus.translation_units()[0].global_scope();
        let f = find_function(&env, global, "logf").expect("logf");
        let signature = match env.decl(f).kind {
            DeclKind::Function(ref decl) => decl.signature,
            ref otherwise => panic!("Unexpected decl: {:?}", otherwise),
        };
        match env.type_(signature).kind {
            TypeKind::Function(ref fn_type) => {
                assert_eq!(fn_type.parameters.len(), 2);
                assert!(fn_type.parameters[1].is_variadic);
                assert_eq!(fn_type.parameters[1].param_type, env.variadic_type());
            }
            ref otherwise => panic!("Unexpected type: {:?}", otherwise),
        }
    }
}
