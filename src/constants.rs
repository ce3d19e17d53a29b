//! Constants defined by the DWARF standard, plus the GNU extensions
//! this crate understands.
//!
//! Each family of constants is a newtype over its raw encoding, so
//! that vendor values outside the standard enumeration survive a
//! round-trip through the parser instead of failing it.

#![allow(non_upper_case_globals)]
#![allow(missing_docs)]

use std::fmt;

macro_rules! dw {
    ($name:ident($ty:ty) { $($const_name:ident = $val:expr),+ $(,)* }) => {
        /// See the module level documentation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $ty);

        $(
            pub const $const_name: $name = $name($val);
        )+

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match *self {
                    $(
                        $const_name => f.write_str(stringify!($const_name)),
                    )+
                    _ => write!(f, "{}({:#x})", stringify!($name), self.0),
                }
            }
        }
    };
}

dw!(DwChildren(u8) {
    DW_CHILDREN_no = 0x00,
    DW_CHILDREN_yes = 0x01,
});

dw!(DwTag(u64) {
    DW_TAG_null = 0x00,
    DW_TAG_array_type = 0x01,
    DW_TAG_class_type = 0x02,
    DW_TAG_entry_point = 0x03,
    DW_TAG_enumeration_type = 0x04,
    DW_TAG_formal_parameter = 0x05,
    DW_TAG_imported_declaration = 0x08,
    DW_TAG_label = 0x0a,
    DW_TAG_lexical_block = 0x0b,
    DW_TAG_member = 0x0d,
    DW_TAG_pointer_type = 0x0f,
    DW_TAG_reference_type = 0x10,
    DW_TAG_compile_unit = 0x11,
    DW_TAG_string_type = 0x12,
    DW_TAG_structure_type = 0x13,
    DW_TAG_subroutine_type = 0x15,
    DW_TAG_typedef = 0x16,
    DW_TAG_union_type = 0x17,
    DW_TAG_unspecified_parameters = 0x18,
    DW_TAG_variant = 0x19,
    DW_TAG_common_block = 0x1a,
    DW_TAG_common_inclusion = 0x1b,
    DW_TAG_inheritance = 0x1c,
    DW_TAG_inlined_subroutine = 0x1d,
    DW_TAG_module = 0x1e,
    DW_TAG_ptr_to_member_type = 0x1f,
    DW_TAG_set_type = 0x20,
    DW_TAG_subrange_type = 0x21,
    DW_TAG_with_stmt = 0x22,
    DW_TAG_access_declaration = 0x23,
    DW_TAG_base_type = 0x24,
    DW_TAG_catch_block = 0x25,
    DW_TAG_const_type = 0x26,
    DW_TAG_constant = 0x27,
    DW_TAG_enumerator = 0x28,
    DW_TAG_file_type = 0x29,
    DW_TAG_friend = 0x2a,
    DW_TAG_namelist = 0x2b,
    DW_TAG_namelist_item = 0x2c,
    DW_TAG_packed_type = 0x2d,
    DW_TAG_subprogram = 0x2e,
    DW_TAG_template_type_parameter = 0x2f,
    DW_TAG_template_value_parameter = 0x30,
    DW_TAG_thrown_type = 0x31,
    DW_TAG_try_block = 0x32,
    DW_TAG_variant_part = 0x33,
    DW_TAG_variable = 0x34,
    DW_TAG_volatile_type = 0x35,
    DW_TAG_dwarf_procedure = 0x36,
    DW_TAG_restrict_type = 0x37,
    DW_TAG_interface_type = 0x38,
    DW_TAG_namespace = 0x39,
    DW_TAG_imported_module = 0x3a,
    DW_TAG_unspecified_type = 0x3b,
    DW_TAG_partial_unit = 0x3c,
    DW_TAG_imported_unit = 0x3d,
    DW_TAG_condition = 0x3f,
    DW_TAG_shared_type = 0x40,
    DW_TAG_type_unit = 0x41,
    DW_TAG_rvalue_reference_type = 0x42,
    DW_TAG_template_alias = 0x43,
    DW_TAG_coarray_type = 0x44,
    DW_TAG_generic_subrange = 0x45,
    DW_TAG_dynamic_type = 0x46,
    DW_TAG_atomic_type = 0x47,
    DW_TAG_call_site = 0x48,
    DW_TAG_call_site_parameter = 0x49,
    DW_TAG_skeleton_unit = 0x4a,
    DW_TAG_immutable_type = 0x4b,
    DW_TAG_lo_user = 0x4080,
    DW_TAG_GNU_template_parameter_pack = 0x4107,
    DW_TAG_hi_user = 0xffff,
});

impl DwTag {
    /// Whether this tag describes a type.
    pub fn is_type_tag(self) -> bool {
        match self {
            DW_TAG_array_type |
            DW_TAG_class_type |
            DW_TAG_enumeration_type |
            DW_TAG_pointer_type |
            DW_TAG_reference_type |
            DW_TAG_rvalue_reference_type |
            DW_TAG_string_type |
            DW_TAG_structure_type |
            DW_TAG_subroutine_type |
            DW_TAG_typedef |
            DW_TAG_union_type |
            DW_TAG_ptr_to_member_type |
            DW_TAG_subrange_type |
            DW_TAG_base_type |
            DW_TAG_const_type |
            DW_TAG_packed_type |
            DW_TAG_volatile_type |
            DW_TAG_restrict_type |
            DW_TAG_unspecified_type |
            DW_TAG_shared_type => true,
            _ => false,
        }
    }

    /// Whether this tag describes a class, structure or union.
    pub fn is_class_or_union_tag(self) -> bool {
        match self {
            DW_TAG_class_type | DW_TAG_structure_type | DW_TAG_union_type => true,
            _ => false,
        }
    }

    /// Whether this tag describes a declaration the IR models.
    pub fn is_decl_tag(self) -> bool {
        match self {
            DW_TAG_variable | DW_TAG_subprogram | DW_TAG_namespace |
            DW_TAG_member | DW_TAG_formal_parameter => true,
            _ => false,
        }
    }
}

dw!(DwAt(u64) {
    DW_AT_sibling = 0x01,
    DW_AT_location = 0x02,
    DW_AT_name = 0x03,
    DW_AT_ordering = 0x09,
    DW_AT_byte_size = 0x0b,
    DW_AT_bit_offset = 0x0c,
    DW_AT_bit_size = 0x0d,
    DW_AT_stmt_list = 0x10,
    DW_AT_low_pc = 0x11,
    DW_AT_high_pc = 0x12,
    DW_AT_language = 0x13,
    DW_AT_discr = 0x15,
    DW_AT_discr_value = 0x16,
    DW_AT_visibility = 0x17,
    DW_AT_import = 0x18,
    DW_AT_string_length = 0x19,
    DW_AT_common_reference = 0x1a,
    DW_AT_comp_dir = 0x1b,
    DW_AT_const_value = 0x1c,
    DW_AT_containing_type = 0x1d,
    DW_AT_default_value = 0x1e,
    DW_AT_inline = 0x20,
    DW_AT_is_optional = 0x21,
    DW_AT_lower_bound = 0x22,
    DW_AT_producer = 0x25,
    DW_AT_prototyped = 0x27,
    DW_AT_return_addr = 0x2a,
    DW_AT_start_scope = 0x2c,
    DW_AT_bit_stride = 0x2e,
    DW_AT_upper_bound = 0x2f,
    DW_AT_abstract_origin = 0x31,
    DW_AT_accessibility = 0x32,
    DW_AT_address_class = 0x33,
    DW_AT_artificial = 0x34,
    DW_AT_base_types = 0x35,
    DW_AT_calling_convention = 0x36,
    DW_AT_count = 0x37,
    DW_AT_data_member_location = 0x38,
    DW_AT_decl_column = 0x39,
    DW_AT_decl_file = 0x3a,
    DW_AT_decl_line = 0x3b,
    DW_AT_declaration = 0x3c,
    DW_AT_discr_list = 0x3d,
    DW_AT_encoding = 0x3e,
    DW_AT_external = 0x3f,
    DW_AT_frame_base = 0x40,
    DW_AT_friend = 0x41,
    DW_AT_identifier_case = 0x42,
    DW_AT_macro_info = 0x43,
    DW_AT_namelist_item = 0x44,
    DW_AT_priority = 0x45,
    DW_AT_segment = 0x46,
    DW_AT_specification = 0x47,
    DW_AT_static_link = 0x48,
    DW_AT_type = 0x49,
    DW_AT_use_location = 0x4a,
    DW_AT_variable_parameter = 0x4b,
    DW_AT_virtuality = 0x4c,
    DW_AT_vtable_elem_location = 0x4d,
    DW_AT_allocated = 0x4e,
    DW_AT_associated = 0x4f,
    DW_AT_data_location = 0x50,
    DW_AT_byte_stride = 0x51,
    DW_AT_entry_pc = 0x52,
    DW_AT_use_UTF8 = 0x53,
    DW_AT_extension = 0x54,
    DW_AT_ranges = 0x55,
    DW_AT_trampoline = 0x56,
    DW_AT_call_column = 0x57,
    DW_AT_call_file = 0x58,
    DW_AT_call_line = 0x59,
    DW_AT_description = 0x5a,
    DW_AT_binary_scale = 0x5b,
    DW_AT_decimal_scale = 0x5c,
    DW_AT_small = 0x5d,
    DW_AT_decimal_sign = 0x5e,
    DW_AT_digit_count = 0x5f,
    DW_AT_picture_string = 0x60,
    DW_AT_mutable = 0x61,
    DW_AT_threads_scaled = 0x62,
    DW_AT_explicit = 0x63,
    DW_AT_object_pointer = 0x64,
    DW_AT_endianity = 0x65,
    DW_AT_elemental = 0x66,
    DW_AT_pure = 0x67,
    DW_AT_recursive = 0x68,
    DW_AT_signature = 0x69,
    DW_AT_main_subprogram = 0x6a,
    DW_AT_data_bit_offset = 0x6b,
    DW_AT_const_expr = 0x6c,
    DW_AT_enum_class = 0x6d,
    DW_AT_linkage_name = 0x6e,
    DW_AT_string_length_bit_size = 0x6f,
    DW_AT_string_length_byte_size = 0x70,
    DW_AT_rank = 0x71,
    DW_AT_str_offsets_base = 0x72,
    DW_AT_addr_base = 0x73,
    DW_AT_rnglists_base = 0x74,
    DW_AT_deleted = 0x8a,
    DW_AT_defaulted = 0x8b,
    DW_AT_loclists_base = 0x8c,
    DW_AT_lo_user = 0x2000,
    DW_AT_MIPS_linkage_name = 0x2007,
    DW_AT_GNU_vector = 0x2107,
    DW_AT_hi_user = 0x3fff,
});

dw!(DwForm(u64) {
    DW_FORM_null = 0x00,
    DW_FORM_addr = 0x01,
    DW_FORM_block2 = 0x03,
    DW_FORM_block4 = 0x04,
    DW_FORM_data2 = 0x05,
    DW_FORM_data4 = 0x06,
    DW_FORM_data8 = 0x07,
    DW_FORM_string = 0x08,
    DW_FORM_block = 0x09,
    DW_FORM_block1 = 0x0a,
    DW_FORM_data1 = 0x0b,
    DW_FORM_flag = 0x0c,
    DW_FORM_sdata = 0x0d,
    DW_FORM_strp = 0x0e,
    DW_FORM_udata = 0x0f,
    DW_FORM_ref_addr = 0x10,
    DW_FORM_ref1 = 0x11,
    DW_FORM_ref2 = 0x12,
    DW_FORM_ref4 = 0x13,
    DW_FORM_ref8 = 0x14,
    DW_FORM_ref_udata = 0x15,
    DW_FORM_indirect = 0x16,
    DW_FORM_sec_offset = 0x17,
    DW_FORM_exprloc = 0x18,
    DW_FORM_flag_present = 0x19,
    DW_FORM_strx = 0x1a,
    DW_FORM_addrx = 0x1b,
    DW_FORM_ref_sup4 = 0x1c,
    DW_FORM_strp_sup = 0x1d,
    DW_FORM_data16 = 0x1e,
    DW_FORM_line_strp = 0x1f,
    DW_FORM_ref_sig8 = 0x20,
    DW_FORM_implicit_const = 0x21,
    DW_FORM_loclistx = 0x22,
    DW_FORM_rnglistx = 0x23,
    DW_FORM_ref_sup8 = 0x24,
    DW_FORM_strx1 = 0x25,
    DW_FORM_strx2 = 0x26,
    DW_FORM_strx3 = 0x27,
    DW_FORM_strx4 = 0x28,
    DW_FORM_addrx1 = 0x29,
    DW_FORM_addrx2 = 0x2a,
    DW_FORM_addrx3 = 0x2b,
    DW_FORM_addrx4 = 0x2c,
    DW_FORM_GNU_ref_alt = 0x1f20,
    DW_FORM_GNU_strp_alt = 0x1f21,
});

dw!(DwAte(u64) {
    DW_ATE_address = 0x01,
    DW_ATE_boolean = 0x02,
    DW_ATE_complex_float = 0x03,
    DW_ATE_float = 0x04,
    DW_ATE_signed = 0x05,
    DW_ATE_signed_char = 0x06,
    DW_ATE_unsigned = 0x07,
    DW_ATE_unsigned_char = 0x08,
    DW_ATE_imaginary_float = 0x09,
    DW_ATE_packed_decimal = 0x0a,
    DW_ATE_numeric_string = 0x0b,
    DW_ATE_edited = 0x0c,
    DW_ATE_signed_fixed = 0x0d,
    DW_ATE_unsigned_fixed = 0x0e,
    DW_ATE_decimal_float = 0x0f,
    DW_ATE_UTF = 0x10,
});

dw!(DwLang(u64) {
    DW_LANG_C89 = 0x01,
    DW_LANG_C = 0x02,
    DW_LANG_Ada83 = 0x03,
    DW_LANG_C_plus_plus = 0x04,
    DW_LANG_Cobol74 = 0x05,
    DW_LANG_Cobol85 = 0x06,
    DW_LANG_Fortran77 = 0x07,
    DW_LANG_Fortran90 = 0x08,
    DW_LANG_Pascal83 = 0x09,
    DW_LANG_Modula2 = 0x0a,
    DW_LANG_Java = 0x0b,
    DW_LANG_C99 = 0x0c,
    DW_LANG_Ada95 = 0x0d,
    DW_LANG_Fortran95 = 0x0e,
    DW_LANG_PLI = 0x0f,
    DW_LANG_ObjC = 0x10,
    DW_LANG_ObjC_plus_plus = 0x11,
    DW_LANG_UPC = 0x12,
    DW_LANG_D = 0x13,
    DW_LANG_Python = 0x14,
    DW_LANG_Go = 0x16,
    DW_LANG_Modula3 = 0x17,
    DW_LANG_C_plus_plus_03 = 0x19,
    DW_LANG_C_plus_plus_11 = 0x1a,
    DW_LANG_OCaml = 0x1b,
    DW_LANG_Rust = 0x1c,
    DW_LANG_C11 = 0x1d,
    DW_LANG_Fortran03 = 0x22,
    DW_LANG_Fortran08 = 0x23,
    DW_LANG_C_plus_plus_14 = 0x21,
    DW_LANG_Mips_Assembler = 0x8001,
});

impl DwLang {
    /// Whether this language is one of the C family.
    pub fn is_c_family(self) -> bool {
        match self {
            DW_LANG_C89 | DW_LANG_C | DW_LANG_C99 | DW_LANG_C11 |
            DW_LANG_ObjC | DW_LANG_UPC => true,
            _ => false,
        }
    }

    /// Whether this language is one of the C++ family.
    pub fn is_cplusplus_family(self) -> bool {
        match self {
            DW_LANG_C_plus_plus | DW_LANG_C_plus_plus_03 |
            DW_LANG_C_plus_plus_11 | DW_LANG_C_plus_plus_14 |
            DW_LANG_ObjC_plus_plus => true,
            _ => false,
        }
    }

    /// Whether the One Definition Rule applies to this language, so
    /// that two types with the same name denote the same type.
    pub fn has_odr(self) -> bool {
        self.is_cplusplus_family() ||
        match self {
            DW_LANG_Java | DW_LANG_Ada83 | DW_LANG_Ada95 => true,
            _ => false,
        }
    }

    /// The default lower bound of array subranges for this language
    /// when `DW_AT_lower_bound` is absent.
    pub fn default_lower_bound(self) -> u64 {
        match self {
            DW_LANG_Ada83 | DW_LANG_Ada95 | DW_LANG_Cobol74 |
            DW_LANG_Cobol85 | DW_LANG_Fortran77 | DW_LANG_Fortran90 |
            DW_LANG_Fortran95 | DW_LANG_Fortran03 | DW_LANG_Fortran08 |
            DW_LANG_Pascal83 | DW_LANG_Modula2 | DW_LANG_Modula3 |
            DW_LANG_PLI => 1,
            _ => 0,
        }
    }
}

dw!(DwAccess(u64) {
    DW_ACCESS_public = 0x01,
    DW_ACCESS_protected = 0x02,
    DW_ACCESS_private = 0x03,
});

dw!(DwVirtuality(u64) {
    DW_VIRTUALITY_none = 0x00,
    DW_VIRTUALITY_virtual = 0x01,
    DW_VIRTUALITY_pure_virtual = 0x02,
});

dw!(DwOp(u8) {
    DW_OP_addr = 0x03,
    DW_OP_deref = 0x06,
    DW_OP_const1u = 0x08,
    DW_OP_const1s = 0x09,
    DW_OP_const2u = 0x0a,
    DW_OP_const2s = 0x0b,
    DW_OP_const4u = 0x0c,
    DW_OP_const4s = 0x0d,
    DW_OP_const8u = 0x0e,
    DW_OP_const8s = 0x0f,
    DW_OP_constu = 0x10,
    DW_OP_consts = 0x11,
    DW_OP_dup = 0x12,
    DW_OP_drop = 0x13,
    DW_OP_over = 0x14,
    DW_OP_pick = 0x15,
    DW_OP_swap = 0x16,
    DW_OP_rot = 0x17,
    DW_OP_xderef = 0x18,
    DW_OP_abs = 0x19,
    DW_OP_and = 0x1a,
    DW_OP_div = 0x1b,
    DW_OP_minus = 0x1c,
    DW_OP_mod = 0x1d,
    DW_OP_mul = 0x1e,
    DW_OP_neg = 0x1f,
    DW_OP_not = 0x20,
    DW_OP_or = 0x21,
    DW_OP_plus = 0x22,
    DW_OP_plus_uconst = 0x23,
    DW_OP_shl = 0x24,
    DW_OP_shr = 0x25,
    DW_OP_shra = 0x26,
    DW_OP_xor = 0x27,
    DW_OP_bra = 0x28,
    DW_OP_eq = 0x29,
    DW_OP_ge = 0x2a,
    DW_OP_gt = 0x2b,
    DW_OP_le = 0x2c,
    DW_OP_lt = 0x2d,
    DW_OP_ne = 0x2e,
    DW_OP_skip = 0x2f,
    DW_OP_lit0 = 0x30,
    DW_OP_lit31 = 0x4f,
    DW_OP_reg0 = 0x50,
    DW_OP_reg31 = 0x6f,
    DW_OP_breg0 = 0x70,
    DW_OP_breg31 = 0x8f,
    DW_OP_regx = 0x90,
    DW_OP_fbreg = 0x91,
    DW_OP_bregx = 0x92,
    DW_OP_piece = 0x93,
    DW_OP_deref_size = 0x94,
    DW_OP_xderef_size = 0x95,
    DW_OP_nop = 0x96,
    DW_OP_push_object_address = 0x97,
    DW_OP_call2 = 0x98,
    DW_OP_call4 = 0x99,
    DW_OP_call_ref = 0x9a,
    DW_OP_form_tls_address = 0x9b,
    DW_OP_call_frame_cfa = 0x9c,
    DW_OP_bit_piece = 0x9d,
    DW_OP_implicit_value = 0x9e,
    DW_OP_stack_value = 0x9f,
    DW_OP_GNU_push_tls_address = 0xe0,
});

impl DwOp {
    /// Whether this opcode is one of `DW_OP_lit0 .. DW_OP_lit31`.
    pub fn is_lit(self) -> bool {
        self >= DW_OP_lit0 && self <= DW_OP_lit31
    }

    /// Whether this opcode is one of `DW_OP_reg0 .. DW_OP_reg31`.
    pub fn is_reg(self) -> bool {
        self >= DW_OP_reg0 && self <= DW_OP_reg31
    }

    /// Whether this opcode is one of `DW_OP_breg0 .. DW_OP_breg31`.
    pub fn is_breg(self) -> bool {
        self >= DW_OP_breg0 && self <= DW_OP_breg31
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_known() {
        assert_eq!(format!("{}", DW_TAG_compile_unit), "DW_TAG_compile_unit");
        assert_eq!(format!("{}", DW_AT_linkage_name), "DW_AT_linkage_name");
    }

    #[test]
    fn test_display_unknown() {
        assert_eq!(format!("{}", DwTag(0x4242)), "DwTag(0x4242)");
    }

    #[test]
    fn test_lang_predicates() {
        assert!(DW_LANG_C99.is_c_family());
        assert!(DW_LANG_C_plus_plus_11.is_cplusplus_family());
        assert!(DW_LANG_C_plus_plus.has_odr());
        assert!(!DW_LANG_C.has_odr());
        assert_eq!(DW_LANG_Fortran90.default_lower_bound(), 1);
        assert_eq!(DW_LANG_C.default_lower_bound(), 0);
    }

    #[test]
    fn test_op_ranges() {
        assert!(DwOp(0x35).is_lit());
        assert!(!DwOp(0x50).is_lit());
        assert!(DwOp(0x55).is_reg());
        assert!(DwOp(0x75).is_breg());
    }
}
