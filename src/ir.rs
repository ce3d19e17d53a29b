//! The ABI intermediate representation: an environment owning every
//! node in index arenas, scopes and translation units, types and
//! declarations, and the corpus tying them to a binary's symbols.
//!
//! Nodes reference each other through plain index handles, so cyclic
//! type graphs need no reference counting; equality over types is
//! identity of their canonical representatives.

use std::collections::HashMap;

use constants;
use symbols::{SymbolId, SymbolTable};

/// Handle of an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Istr(u32);

/// Handle of a type in the environment's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// The handle of the type at the given arena index.
    pub fn from_index(index: usize) -> TypeId {
        TypeId(index as u32)
    }

    /// This handle's arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a declaration in the environment's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

impl DeclId {
    /// The handle of the declaration at the given arena index.
    pub fn from_index(index: usize) -> DeclId {
        DeclId(index as u32)
    }

    /// This handle's arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a scope in the environment's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

/// A string interner. Interning makes name equality a handle
/// comparison and keeps the IR arenas free of owned strings.
#[derive(Debug, Default)]
pub struct Interner {
    map: HashMap<String, Istr>,
    strings: Vec<String>,
}

impl Interner {
    fn intern(&mut self, s: &str) -> Istr {
        if let Some(&istr) = self.map.get(s) {
            return istr;
        }
        let istr = Istr(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.map.insert(s.to_string(), istr);
        istr
    }

    fn resolve(&self, istr: Istr) -> &str {
        &self.strings[istr.0 as usize]
    }
}

bitflags! {
    /// cv-qualifiers, composable as a set.
    pub struct Qualifiers: u8 {
        /// `const`.
        const CONST = 0x1;
        /// `volatile`.
        const VOLATILE = 0x2;
        /// `restrict`.
        const RESTRICT = 0x4;
    }
}

bitflags! {
    /// Non-fatal conditions observed while reading a binary, carried
    /// on the successful-but-partial corpus.
    pub struct ReadStatus: u8 {
        /// The primary file carries no `.debug_info`.
        const DEBUG_INFO_NOT_FOUND = 0x1;
        /// The `.gnu_debugaltlink` file could not be located.
        const ALT_DEBUG_INFO_NOT_FOUND = 0x2;
        /// No symbol table was found.
        const NO_SYMBOLS_FOUND = 0x4;
    }
}

/// Member access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `public`.
    Public,
    /// `protected`.
    Protected,
    /// `private`.
    Private,
}

/// Whether a class-like type was declared `struct`, `class` or
/// `union`. The default member access follows from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Declared with `struct`.
    Struct,
    /// Declared with `class`.
    Class,
    /// Declared with `union`.
    Union,
}

impl ClassKind {
    /// The access members get when the DIE does not state one.
    pub fn default_access(self) -> Access {
        match self {
            ClassKind::Struct => Access::Public,
            ClassKind::Class | ClassKind::Union => Access::Private,
        }
    }
}

/// Virtuality of a member function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Virtuality {
    /// Not virtual.
    None,
    /// Virtual.
    Virtual,
    /// Pure virtual.
    PureVirtual,
}

/// One enumerator of an enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enumerator {
    /// The enumerator's name.
    pub name: Istr,
    /// Its constant value, sign bits preserved.
    pub value: i64,
}

/// One base-class specification of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseSpec {
    /// The base class.
    pub base: TypeId,
    /// Inheritance access.
    pub access: Access,
    /// Offset of the base subobject within the derived class, in bits.
    pub offset_bits: u64,
    /// Whether this is virtual inheritance.
    pub is_virtual: bool,
}

/// One data member of a class or union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataMember {
    /// The member's name.
    pub name: Istr,
    /// The member's type.
    pub mem_type: TypeId,
    /// Offset within the class in bits; `None` for static members.
    pub offset_bits: Option<u64>,
    /// Member access.
    pub access: Access,
}

/// A class, structure or union type.
#[derive(Debug, Clone)]
pub struct ClassType {
    /// The declared name; `None` for anonymous types.
    pub name: Option<Istr>,
    /// struct / class / union.
    pub kind: ClassKind,
    /// Size in bits.
    pub size_bits: u64,
    /// Whether this is a forward declaration without a body.
    pub is_declaration_only: bool,
    /// The resolved definition, once declaration-only resolution ran.
    pub definition: Option<TypeId>,
    /// Base classes, in declaration order.
    pub bases: Vec<BaseSpec>,
    /// Data members, in declaration order.
    pub members: Vec<DataMember>,
    /// Member functions.
    pub methods: Vec<DeclId>,
    /// Member types.
    pub member_types: Vec<TypeId>,
    /// The typedef that names this anonymous type, if any.
    pub naming_typedef: Option<TypeId>,
    /// For anonymous members: the index among same-kind anonymous
    /// siblings, so repeated anonymous members do not collide.
    pub anonymous_index: Option<u32>,
    /// Declaration coordinates (file, line), for location-based reuse.
    pub decl_location: Option<(u64, u64)>,
}

/// One formal parameter of a function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    /// The parameter's name, when stated.
    pub name: Option<Istr>,
    /// The parameter's type.
    pub param_type: TypeId,
    /// Whether this is the trailing variadic marker.
    pub is_variadic: bool,
    /// Whether the producer marked the parameter artificial (the
    /// implicit `this`, for instance).
    pub is_artificial: bool,
}

/// A function or member-function type.
#[derive(Debug, Clone)]
pub struct FunctionType {
    /// The return type; `None` means `void`.
    pub return_type: Option<TypeId>,
    /// Formal parameters in order. A variadic function ends with a
    /// single variadic-marker parameter.
    pub parameters: Vec<Parameter>,
    /// For methods: the class `this` points to.
    pub class: Option<TypeId>,
    /// For methods: whether `this` points to a const class.
    pub is_const: bool,
}

/// An array subrange: lower bound plus optional upper bound, `None`
/// meaning an array of unknown length.
#[derive(Debug, Clone)]
pub struct SubrangeType {
    /// Optional name (some producers name subrange types).
    pub name: Option<Istr>,
    /// The lower bound, per the language's default when unstated.
    pub lower: u64,
    /// The upper bound, or `None` when the extent is unknown.
    pub upper: Option<u64>,
    /// The index type, when stated.
    pub underlying: Option<TypeId>,
}

impl SubrangeType {
    /// The number of elements, when bounded.
    pub fn length(&self) -> Option<u64> {
        self.upper.map(|upper| upper.wrapping_sub(self.lower).wrapping_add(1))
    }
}

/// An enum type.
#[derive(Debug, Clone)]
pub struct EnumType {
    /// The declared name; `None` for anonymous enums.
    pub name: Option<Istr>,
    /// Size in bits.
    pub size_bits: u64,
    /// The synthesized underlying integer type.
    pub underlying: TypeId,
    /// Enumerators in declaration order.
    pub enumerators: Vec<Enumerator>,
    /// For anonymous members: index among same-kind anonymous siblings.
    pub anonymous_index: Option<u32>,
    /// Whether this is a forward declaration.
    pub is_declaration_only: bool,
}

/// The kind-specific payload of a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// The canonical `void`.
    Void,
    /// The canonical variadic-parameter marker type.
    Variadic,
    /// A base (builtin) type.
    Base {
        /// Normalized name.
        name: Istr,
        /// Size in bits.
        size_bits: u64,
    },
    /// A typedef.
    Typedef {
        /// The typedef's name.
        name: Istr,
        /// The aliased type.
        underlying: TypeId,
    },
    /// A pointer type.
    Pointer {
        /// The pointed-to type.
        pointee: TypeId,
        /// Size in bits (the address size of the defining unit).
        size_bits: u64,
    },
    /// An lvalue or rvalue reference type.
    Reference {
        /// The referred-to type.
        pointee: TypeId,
        /// `true` for `&`, `false` for `&&`.
        is_lvalue: bool,
        /// Size in bits.
        size_bits: u64,
    },
    /// A cv-qualified type.
    Qualified {
        /// The qualified type.
        underlying: TypeId,
        /// The qualifier set.
        quals: Qualifiers,
    },
    /// An array type with ordered subranges.
    Array {
        /// The element type, shared with every other array of it.
        element: TypeId,
        /// One subrange per dimension, outermost first.
        subranges: Vec<TypeId>,
    },
    /// One dimension of an array.
    Subrange(SubrangeType),
    /// An enum.
    Enum(EnumType),
    /// A class, struct or union.
    Class(ClassType),
    /// A function or method type.
    Function(FunctionType),
}

/// A type node.
#[derive(Debug, Clone)]
pub struct Type {
    /// The payload.
    pub kind: TypeKind,
    /// The owning scope, once inserted.
    pub scope: Option<ScopeId>,
    /// The canonical representative, once canonicalized.
    canonical: Option<TypeId>,
}

impl Type {
    /// A new type with the given payload, not yet owned by a scope.
    pub fn new(kind: TypeKind) -> Type {
        Type {
            kind: kind,
            scope: None,
            canonical: None,
        }
    }

    /// The canonical representative, when one has been chosen.
    pub fn canonical(&self) -> Option<TypeId> {
        self.canonical
    }
}

/// A variable declaration.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    /// The declared name.
    pub name: Istr,
    /// The mangled name, when distinct.
    pub linkage_name: Option<Istr>,
    /// The variable's type.
    pub var_type: TypeId,
    /// The bound ELF symbol, when the variable is exported.
    pub symbol: Option<SymbolId>,
    /// The load address recovered from the location expression.
    pub address: Option<u64>,
    /// Whether the address designates thread-local storage.
    pub is_tls: bool,
    /// Whether this is a static data member of a class.
    pub is_static_member: bool,
    /// Member access, for static members.
    pub access: Option<Access>,
}

/// A function declaration.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// The declared name.
    pub name: Istr,
    /// The mangled name, when distinct.
    pub linkage_name: Option<Istr>,
    /// The function's type.
    pub signature: TypeId,
    /// The bound ELF symbol, when the function is exported.
    pub symbol: Option<SymbolId>,
    /// The function's entry address, when stated.
    pub address: Option<u64>,
    /// Member access, for methods.
    pub access: Option<Access>,
    /// Whether this is a static member function.
    pub is_static: bool,
    /// Whether this is a constructor.
    pub is_ctor: bool,
    /// Whether this is a destructor.
    pub is_dtor: bool,
    /// Virtuality, for methods.
    pub virtuality: Virtuality,
    /// Index into the vtable, for virtual methods.
    pub vtable_index: Option<u64>,
}

/// The kind-specific payload of a declaration.
#[derive(Debug, Clone)]
pub enum DeclKind {
    /// A variable.
    Variable(VariableDecl),
    /// A function.
    Function(FunctionDecl),
}

/// A declaration node.
#[derive(Debug, Clone)]
pub struct Decl {
    /// The payload.
    pub kind: DeclKind,
    /// The owning scope.
    pub scope: ScopeId,
}

impl Decl {
    /// The declared name.
    pub fn name(&self) -> Istr {
        match self.kind {
            DeclKind::Variable(ref v) => v.name,
            DeclKind::Function(ref f) => f.name,
        }
    }

    /// The linkage name, when one was stated.
    pub fn linkage_name(&self) -> Option<Istr> {
        match self.kind {
            DeclKind::Variable(ref v) => v.linkage_name,
            DeclKind::Function(ref f) => f.linkage_name,
        }
    }

    /// The bound ELF symbol.
    pub fn symbol(&self) -> Option<SymbolId> {
        match self.kind {
            DeclKind::Variable(ref v) => v.symbol,
            DeclKind::Function(ref f) => f.symbol,
        }
    }
}

/// What a scope is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A translation unit's global scope.
    Global,
    /// A namespace or module.
    Namespace(Istr),
    /// The body of a class or union.
    ClassBody(TypeId),
}

/// A namespace or class-body scope. Scopes form a tree rooted at a
/// translation unit's global scope.
#[derive(Debug, Clone)]
pub struct Scope {
    /// What this scope is.
    pub kind: ScopeKind,
    /// The enclosing scope.
    pub parent: Option<ScopeId>,
    /// Declarations inserted into this scope, in insertion order.
    pub decls: Vec<DeclId>,
    /// Types inserted into this scope, in insertion order.
    pub types: Vec<TypeId>,
}

/// A translation unit: one compilation unit's worth of IR, or several
/// merged units sharing an absolute path.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    path: String,
    comp_dir: Option<String>,
    language: constants::DwLang,
    global_scope: ScopeId,
}

impl TranslationUnit {
    /// Construct a translation unit over the given global scope.
    pub fn new(path: String,
               comp_dir: Option<String>,
               language: constants::DwLang,
               global_scope: ScopeId)
               -> TranslationUnit {
        TranslationUnit {
            path: path,
            comp_dir: comp_dir,
            language: language,
            global_scope: global_scope,
        }
    }

    /// The unit's source path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The unit's compilation directory.
    pub fn comp_dir(&self) -> Option<&str> {
        self.comp_dir.as_ref().map(|s| &s[..])
    }

    /// The unit's source language.
    pub fn language(&self) -> constants::DwLang {
        self.language
    }

    /// The unit's global scope.
    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    /// The absolute path used for unit merging.
    pub fn absolute_path(&self) -> String {
        if self.path.starts_with('/') {
            return self.path.clone();
        }
        match self.comp_dir {
            Some(ref dir) => format!("{}/{}", dir, self.path),
            None => self.path.clone(),
        }
    }
}

/// Where a corpus came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusOrigin {
    /// Built from DWARF debug information.
    Dwarf,
}

/// The ABI corpus of one binary.
#[derive(Debug)]
pub struct Corpus {
    /// Where the corpus came from.
    pub origin: CorpusOrigin,
    /// The binary's path.
    pub path: String,
    /// The binary's `DT_SONAME`, when present.
    pub soname: Option<String>,
    /// The binary's `DT_NEEDED` list.
    pub needed: Vec<String>,
    /// The binary's architecture name.
    pub architecture: String,
    /// The translation units, in `.debug_info` order.
    translation_units: Vec<TranslationUnit>,
    /// The binary's symbol database.
    pub symtab: SymbolTable,
    /// Exported functions, sorted for deterministic serialization.
    pub exported_functions: Vec<DeclId>,
    /// Exported variables, sorted for deterministic serialization.
    pub exported_variables: Vec<DeclId>,
    /// Non-fatal conditions observed while reading.
    pub status: ReadStatus,
}

impl Corpus {
    /// A new, empty corpus for the given binary.
    pub fn new(path: String, architecture: String, symtab: SymbolTable) -> Corpus {
        Corpus {
            origin: CorpusOrigin::Dwarf,
            path: path,
            soname: None,
            needed: Vec::new(),
            architecture: architecture,
            translation_units: Vec::new(),
            symtab: symtab,
            exported_functions: Vec::new(),
            exported_variables: Vec::new(),
            status: ReadStatus::empty(),
        }
    }

    /// The corpus's translation units, in `.debug_info` order.
    pub fn translation_units(&self) -> &[TranslationUnit] {
        &self.translation_units
    }

    /// Append a translation unit; returns its index.
    pub fn add_translation_unit(&mut self, tu: TranslationUnit) -> usize {
        self.translation_units.push(tu);
        self.translation_units.len() - 1
    }

    /// The translation unit at the given index.
    pub fn translation_unit(&self, index: usize) -> &TranslationUnit {
        &self.translation_units[index]
    }
}

/// The process-wide registry owning every IR node, the string
/// interner, and the canonical void and variadic types.
///
/// An environment may back several corpora, as long as they are not
/// read concurrently; once `canonicalization_is_done` is set, no
/// further structural edits are permitted on any IR rooted in it.
#[derive(Debug)]
pub struct Environment {
    types: Vec<Type>,
    decls: Vec<Decl>,
    scopes: Vec<Scope>,
    interner: Interner,
    void_type: TypeId,
    variadic_type: TypeId,
    canonicalization_is_done: bool,
}

impl Environment {
    /// A new environment with the canonical void and variadic types
    /// pre-seeded.
    pub fn new() -> Environment {
        let mut env = Environment {
            types: Vec::new(),
            decls: Vec::new(),
            scopes: Vec::new(),
            interner: Interner::default(),
            void_type: TypeId(0),
            variadic_type: TypeId(0),
            canonicalization_is_done: false,
        };
        env.void_type = env.add_type(Type::new(TypeKind::Void));
        env.variadic_type = env.add_type(Type::new(TypeKind::Variadic));
        // void and the variadic marker are their own canonical forms.
        let void = env.void_type;
        let variadic = env.variadic_type;
        env.set_canonical(void, void);
        env.set_canonical(variadic, variadic);
        env
    }

    /// Intern a string.
    pub fn intern(&mut self, s: &str) -> Istr {
        self.interner.intern(s)
    }

    /// Resolve an interned string.
    pub fn str(&self, istr: Istr) -> &str {
        self.interner.resolve(istr)
    }

    /// The canonical `void` type.
    pub fn void_type(&self) -> TypeId {
        self.void_type
    }

    /// The canonical variadic-parameter type.
    pub fn variadic_type(&self) -> TypeId {
        self.variadic_type
    }

    /// Whether structural edits are still permitted.
    pub fn canonicalization_is_done(&self) -> bool {
        self.canonicalization_is_done
    }

    /// Freeze the environment: after this, no structural edits.
    pub fn set_canonicalization_is_done(&mut self) {
        self.canonicalization_is_done = true;
    }

    /// Add a type to the arena.
    pub fn add_type(&mut self, ty: Type) -> TypeId {
        assert!(!self.canonicalization_is_done,
                "structural edit after canonicalization finished");
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// The type with the given handle.
    pub fn type_(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// Mutable access to a type; forbidden once canonicalization is
    /// done.
    pub fn type_mut(&mut self, id: TypeId) -> &mut Type {
        assert!(!self.canonicalization_is_done,
                "structural edit after canonicalization finished");
        &mut self.types[id.0 as usize]
    }

    /// The number of types in the arena.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Record `canon` as `id`'s canonical representative. Once set
    /// for a type, the representative is never changed.
    pub fn set_canonical(&mut self, id: TypeId, canon: TypeId) {
        let slot = &mut self.types[id.0 as usize].canonical;
        if slot.is_none() {
            *slot = Some(canon);
        }
    }

    /// The canonical representative of `id`, or `id` itself when none
    /// has been chosen yet.
    pub fn canonical_type(&self, id: TypeId) -> TypeId {
        self.types[id.0 as usize].canonical.unwrap_or(id)
    }

    /// Behavioural equality of types: identity of canonical
    /// representatives.
    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        self.canonical_type(a) == self.canonical_type(b)
    }

    /// Add a declaration to the arena and its scope.
    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        assert!(!self.canonicalization_is_done,
                "structural edit after canonicalization finished");
        let id = DeclId(self.decls.len() as u32);
        let scope = decl.scope;
        self.decls.push(decl);
        self.scopes[scope.0 as usize].decls.push(id);
        id
    }

    /// The declaration with the given handle.
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    /// Mutable access to a declaration.
    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        assert!(!self.canonicalization_is_done,
                "structural edit after canonicalization finished");
        &mut self.decls[id.0 as usize]
    }

    /// The number of declarations in the arena.
    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    /// Add a scope to the arena, linking it under its parent.
    pub fn add_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        assert!(!self.canonicalization_is_done,
                "structural edit after canonicalization finished");
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind: kind,
            parent: parent,
            decls: Vec::new(),
            types: Vec::new(),
        });
        id
    }

    /// The scope with the given handle.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Mutable access to a scope.
    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        assert!(!self.canonicalization_is_done,
                "structural edit after canonicalization finished");
        &mut self.scopes[id.0 as usize]
    }

    /// Insert a type into a scope, making the scope its owner.
    pub fn add_type_to_scope(&mut self, ty: TypeId, scope: ScopeId) {
        if self.types[ty.0 as usize].scope.is_none() {
            self.types[ty.0 as usize].scope = Some(scope);
            self.scopes[scope.0 as usize].types.push(ty);
        }
    }

    /// The `scope::chain::` prefix of a scope, without a trailing
    /// separator for the global scope.
    pub fn scope_qualified_name(&self, id: ScopeId) -> String {
        let mut components = Vec::new();
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = self.scope(scope_id);
            match scope.kind {
                ScopeKind::Global => {}
                ScopeKind::Namespace(name) => {
                    components.push(self.str(name).to_string())
                }
                ScopeKind::ClassBody(class) => {
                    let name = match self.type_(class).kind {
                        TypeKind::Class(ref c) => c.name,
                        TypeKind::Enum(ref e) => e.name,
                        _ => None,
                    };
                    components.push(name.map(|n| self.str(n).to_string())
                        .unwrap_or_else(|| "<anonymous>".to_string()));
                }
            }
            current = scope.parent;
        }
        components.reverse();
        components.join("::")
    }

    /// The fully qualified name of a declaration.
    pub fn decl_qualified_name(&self, id: DeclId) -> String {
        let decl = self.decl(id);
        let prefix = self.scope_qualified_name(decl.scope);
        let name = self.str(decl.name());
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", prefix, name)
        }
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}
