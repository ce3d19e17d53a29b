//! The DWARF handle pair: the primary file's debug info, the optional
//! alternate (`.gnu_debugaltlink`) file's, and the type units, plus
//! cross-source reference resolution and imported-unit points.

use std::collections::HashMap;

use constants;
use die::{DebugInfo, DieId, DieOffset, DieReference, DieSource};
use endianity::{Endianity, EndianBuf};
use parse::Result;

/// A DIE fully qualified by its source.
pub type GlobalDie = (DieSource, DieId);

/// A record of one `DW_TAG_imported_unit` point: where one CU
/// textually inlines another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedUnitPoint {
    /// The offset of the `DW_TAG_imported_unit` DIE itself.
    pub import_site_offset: DieOffset,
    /// The offset of the unit containing the import site.
    pub importing_cu_offset: usize,
    /// The offset of the imported unit's header.
    pub imported_cu_offset: usize,
    /// The offset of the imported unit's root DIE.
    pub imported_die_offset: DieOffset,
    /// The source the imported DIE lives in.
    pub imported_source: DieSource,
}

/// The raw section bytes one debug-info source is parsed from.
#[derive(Debug, Clone, Copy)]
pub struct DwarfSections<'input, Endian>
    where Endian: Endianity
{
    /// `.debug_info`.
    pub debug_info: EndianBuf<'input, Endian>,
    /// `.debug_abbrev`.
    pub debug_abbrev: EndianBuf<'input, Endian>,
    /// `.debug_str`.
    pub debug_str: EndianBuf<'input, Endian>,
    /// `.debug_types`, when present.
    pub debug_types: Option<EndianBuf<'input, Endian>>,
}

impl<'input, Endian> DwarfSections<'input, Endian>
    where Endian: Endianity
{
    /// Sections with only `.debug_info`, `.debug_abbrev` and
    /// `.debug_str`.
    pub fn new(debug_info: EndianBuf<'input, Endian>,
               debug_abbrev: EndianBuf<'input, Endian>,
               debug_str: EndianBuf<'input, Endian>)
               -> DwarfSections<'input, Endian> {
        DwarfSections {
            debug_info: debug_info,
            debug_abbrev: debug_abbrev,
            debug_str: debug_str,
            debug_types: None,
        }
    }
}

/// The DWARF handle pair plus type units.
#[derive(Debug)]
pub struct Dwarf<'input, Endian>
    where Endian: Endianity
{
    primary: DebugInfo<'input, Endian>,
    alternate: Option<DebugInfo<'input, Endian>>,
    type_units: Option<DebugInfo<'input, Endian>>,
    /// Imported-unit points per importing CU offset, in ascending
    /// import-site order.
    imported_points: HashMap<usize, Vec<ImportedUnitPoint>>,
    /// Reverse map: imported CU offset (per source) to the import
    /// site, for logical-parent walks out of partial units.
    import_sites: HashMap<(DieSource, usize), GlobalDie>,
}

impl<'input, Endian> Dwarf<'input, Endian>
    where Endian: Endianity
{
    /// Parse the primary sections, and the alternate file's when
    /// given.
    pub fn parse(primary: DwarfSections<'input, Endian>,
                 alternate: Option<DwarfSections<'input, Endian>>)
                 -> Result<Dwarf<'input, Endian>> {
        let alt_str = alternate
            .map(|s| s.debug_str)
            .unwrap_or_else(|| EndianBuf::new(&[]));

        let primary_info = DebugInfo::parse(DieSource::Primary,
                                            primary.debug_info,
                                            primary.debug_abbrev,
                                            primary.debug_str,
                                            alt_str)?;

        let alternate_info = match alternate {
            Some(sections) => {
                Some(DebugInfo::parse(DieSource::Alternate,
                                      sections.debug_info,
                                      sections.debug_abbrev,
                                      sections.debug_str,
                                      EndianBuf::new(&[]))?)
            }
            None => None,
        };

        let type_units = match primary.debug_types {
            Some(debug_types) => {
                Some(DebugInfo::parse(DieSource::TypeUnit,
                                      debug_types,
                                      primary.debug_abbrev,
                                      primary.debug_str,
                                      alt_str)?)
            }
            None => None,
        };

        let mut dwarf = Dwarf {
            primary: primary_info,
            alternate: alternate_info,
            type_units: type_units,
            imported_points: HashMap::new(),
            import_sites: HashMap::new(),
        };
        dwarf.collect_imported_unit_points();
        Ok(dwarf)
    }

    /// The debug info of the given source, when loaded.
    pub fn info(&self, source: DieSource) -> Option<&DebugInfo<'input, Endian>> {
        match source {
            DieSource::Primary => Some(&self.primary),
            DieSource::Alternate => self.alternate.as_ref(),
            DieSource::TypeUnit => self.type_units.as_ref(),
        }
    }

    /// The primary file's debug info.
    pub fn primary(&self) -> &DebugInfo<'input, Endian> {
        &self.primary
    }

    /// Resolve a DIE-reference attribute found in `from_source`.
    pub fn resolve_reference(&self,
                             from_source: DieSource,
                             reference: DieReference)
                             -> Option<GlobalDie> {
        match reference {
            DieReference::SameSource(offset) => {
                self.info(from_source)
                    .and_then(|info| info.die_at_offset(offset))
                    .map(|id| (from_source, id))
            }
            DieReference::Alternate(offset) => {
                self.alternate
                    .as_ref()
                    .and_then(|info| info.die_at_offset(offset))
                    .map(|id| (DieSource::Alternate, id))
            }
            DieReference::Signature(signature) => {
                self.type_units
                    .as_ref()
                    .and_then(|info| info.die_for_signature(signature))
                    .map(|id| (DieSource::TypeUnit, id))
            }
        }
    }

    /// A DIE-reference attribute of the given DIE, resolved.
    pub fn die_type_reference(&self,
                              (source, id): GlobalDie,
                              name: constants::DwAt)
                              -> Option<GlobalDie> {
        let info = self.info(source)?;
        let reference = info.die_reference(id, name)?;
        self.resolve_reference(source, reference)
    }

    /// The logical parent of a DIE: its tree parent, except that the
    /// root of an imported (partial) unit continues at the import
    /// site's parent.
    pub fn logical_parent(&self, (source, id): GlobalDie) -> Option<GlobalDie> {
        let info = self.info(source)?;
        if let Some(parent) = info.parent(id) {
            return Some((source, parent));
        }
        // A unit root: hop to the import site when this unit is
        // imported somewhere.
        let unit_offset = info.unit_of(id).offset();
        let &(site_source, site_id) =
            self.import_sites.get(&(source, unit_offset))?;
        self.info(site_source)
            .and_then(|site_info| site_info.parent(site_id))
            .map(|parent| (site_source, parent))
    }

    /// The imported-unit points of the CU at `cu_offset` in the
    /// primary source, in ascending import-site order.
    pub fn imported_unit_points(&self, cu_offset: usize) -> &[ImportedUnitPoint] {
        self.imported_points
            .get(&cu_offset)
            .map(|v| &v[..])
            .unwrap_or(&[])
    }

    /// Collect `DW_TAG_imported_unit` points per CU, in source order.
    ///
    /// Pure-C units cannot nest scopes, so their (always empty) point
    /// lists are not materialized.
    fn collect_imported_unit_points(&mut self) {
        let mut points: HashMap<usize, Vec<ImportedUnitPoint>> = HashMap::new();
        let mut sites = HashMap::new();

        for unit_index in 0..self.primary.units().len() {
            let unit = &self.primary.units()[unit_index];
            if unit.language().is_c_family() {
                continue;
            }
            let cu_offset = unit.offset();
            let root = unit.root();
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let die = self.primary.die(id);
                if die.tag() == constants::DW_TAG_imported_unit {
                    if let Some(reference) =
                        self.primary.die_reference(id, constants::DW_AT_import) {
                        let resolved = self.resolve_reference(DieSource::Primary,
                                                              reference);
                        if let Some((imported_source, imported_id)) = resolved {
                            let imported_info = match self.info(imported_source) {
                                Some(info) => info,
                                None => continue,
                            };
                            let imported_unit = imported_info.unit_of(imported_id);
                            let point = ImportedUnitPoint {
                                import_site_offset: die.offset(),
                                importing_cu_offset: cu_offset,
                                imported_cu_offset: imported_unit.offset(),
                                imported_die_offset:
                                    imported_info.die(imported_id).offset(),
                                imported_source: imported_source,
                            };
                            points.entry(cu_offset).or_insert_with(Vec::new).push(point);
                            sites.entry((imported_source, imported_unit.offset()))
                                .or_insert((DieSource::Primary, id));
                        }
                    }
                }
                for &child in self.primary.children(id) {
                    stack.push(child);
                }
            }
        }

        for list in points.values_mut() {
            list.sort_by_key(|p| p.import_site_offset);
        }
        self.imported_points = points;
        self.import_sites = sites;
    }
}
