//! Schema construction from a markup tree.
//!
//! The builder walks a [`MarkupNode`] document and produces a validated,
//! cross-referenced [`Schema`] in a single pass, counting display entities
//! as it goes so the result carries already-sized collections.
//!
//! # Soft failure
//!
//! Schema documents are configuration, not wire data, but they are still
//! authored by humans and partially broken ones are common. The builder
//! therefore recovers locally wherever it can: unknown field types decode as
//! raw, missing names are synthesized from context, out-of-range bit
//! indices are dropped. Every recovery records a [`SchemaDiagnostic`] with
//! the document path of the offending entry. [`SchemaError`] is returned
//! only when no usable schema can be produced at all.

use crate::{
    diagnostics::SchemaDiagnostic,
    errors::{Result, SchemaError},
    markup::MarkupNode,
    model::{
        Annotation, CifMap, ClassSpec, EnableBit, EnumEntry, EnumTable, ExtensionArea, FieldGroup,
        FieldKind, FieldSpec, NoteLevel, RecordArraySpec, RecordSection, Registration, Schema,
        WarnErrBit, CIF_BITS,
    },
};

/// Root element name the builder accepts.
const ROOT_ELEMENT: &str = "schema";

/// Markup-to-model builder. See the module docs for the failure contract.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    diagnostics: Vec<SchemaDiagnostic>,
    nodes: usize,
    leaves: usize,
}

impl SchemaBuilder {
    /// Build a schema from a markup document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotASchema`] if the root element is not
    /// `schema`, and [`SchemaError::NoClasses`] if no class declaration
    /// survives recovery. Everything else degrades to diagnostics inside
    /// the returned schema.
    pub fn build(root: &MarkupNode) -> Result<Schema> {
        if root.name != ROOT_ELEMENT {
            return Err(SchemaError::NotASchema(root.name.clone()));
        }

        let mut builder = SchemaBuilder::default();
        let mut classes: Vec<ClassSpec> = Vec::new();
        let mut registrations: Vec<Registration> = Vec::new();
        let mut default_class: Option<usize> = None;

        for class_node in root.children_named("class") {
            builder.build_class_entry(
                class_node,
                &mut classes,
                &mut registrations,
                &mut default_class,
            );
        }

        if classes.is_empty() {
            return Err(SchemaError::NoClasses);
        }

        tracing::debug!(
            classes = classes.len(),
            registrations = registrations.len(),
            nodes = builder.nodes,
            leaves = builder.leaves,
            diagnostics = builder.diagnostics.len(),
            "schema built"
        );

        Ok(Schema {
            classes,
            registrations,
            default_class,
            node_count: builder.nodes,
            leaf_count: builder.leaves,
            diagnostics: builder.diagnostics,
        })
    }

    fn diag(&mut self, path: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(path, %message, "schema diagnostic");
        self.diagnostics.push(SchemaDiagnostic::new(path, message));
    }

    fn build_class_entry(
        &mut self,
        node: &MarkupNode,
        classes: &mut Vec<ClassSpec>,
        registrations: &mut Vec<Registration>,
        default_class: &mut Option<usize>,
    ) {
        let id = node.attr_u64("id");
        let mask = node.attr_u64("idMask").unwrap_or(u64::MAX);
        let is_default = node.attr_bool("default").unwrap_or(false);
        let path = match id {
            Some(id) => format!("class {id:#x}"),
            None => "class <anonymous>".to_string(),
        };

        let has_content = node.child_named("cifMap").is_some()
            || node.child_named("warnErrMap").is_some()
            || node.child_named("extensionCamFields").is_some();

        if let Some(alias) = node.attr_u64("alias") {
            // Alias entries register an extra identifier range against an
            // already-built class body. The target must precede the alias in
            // document order.
            if has_content {
                self.diag(&path, "class both aliases and defines content; alias wins");
            }
            let Some(id) = id else {
                self.diag(&path, "alias class has no id attribute; entry dropped");
                return;
            };
            let Some(target) = classes.iter().position(|c| c.class_id == alias) else {
                self.diag(
                    &path,
                    format!("alias target {alias:#x} is not a previously defined class; entry dropped"),
                );
                return;
            };
            if is_default {
                self.diag(&path, "default must be declared on a class body; ignored on alias");
            }
            registrations.push(Registration { base: id, mask, class: target });
            return;
        }

        if id.is_none() && !is_default {
            self.diag(&path, "class has neither id nor default marker; entry dropped");
            return;
        }

        let class = self.build_class(node, id.unwrap_or(0), mask, is_default, &path);
        let index = classes.len();
        classes.push(class);

        if let Some(id) = id {
            registrations.push(Registration { base: id, mask, class: index });
        }
        if is_default {
            if default_class.is_some() {
                self.diag(&path, "duplicate default class; first wins");
            } else {
                *default_class = Some(index);
            }
        }
    }

    fn build_class(
        &mut self,
        node: &MarkupNode,
        class_id: u64,
        id_mask: u64,
        is_default: bool,
        path: &str,
    ) -> ClassSpec {
        let mut cif_maps: Vec<CifMap> = Vec::new();
        for map_node in node.children_named("cifMap") {
            self.build_cif_map(map_node, path, &mut cif_maps);
        }

        let mut warn_err_bits = std::collections::BTreeMap::new();
        if let Some(warn_node) = node.child_named("warnErrMap") {
            for bit_node in warn_node.children_named("bit") {
                let Some(index) = bit_node.attr_u8("index").filter(|&i| (i as usize) < CIF_BITS)
                else {
                    self.diag(
                        &format!("{path}/warnErrMap"),
                        "bit index missing or out of range; entry dropped",
                    );
                    continue;
                };
                let name = bit_node
                    .attr("name")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("bit{index}"));
                let description =
                    bit_node.attr("descript").map(str::to_string).unwrap_or_default();
                if warn_err_bits.insert(index, WarnErrBit { name, description }).is_some() {
                    self.diag(
                        &format!("{path}/warnErrMap/bit {index}"),
                        "duplicate warn/err bit; last wins",
                    );
                }
            }
        }

        let extension = node.child_named("extensionCamFields").map(|ext_node| {
            let ext_path = format!("{path}/extensionCamFields");
            let required = ext_node.attr_bool("required").unwrap_or(false);
            self.nodes += 1;
            let fields = self.build_fields(ext_node, "kestrel.ext", &ext_path);
            ExtensionArea { fields, required }
        });

        ClassSpec {
            class_id,
            id_mask,
            is_default,
            cif_maps,
            warn_err_bits,
            extension,
            note: parse_info(node),
        }
    }

    /// Build one `cifMap` element, appending it (and any CIF maps defined
    /// inline inside its link enables) to `out`.
    fn build_cif_map(&mut self, node: &MarkupNode, class_path: &str, out: &mut Vec<CifMap>) {
        let Some(index) = node.attr_u8("index") else {
            self.diag(&format!("{class_path}/cifMap"), "cifMap has no index; dropped");
            return;
        };
        let map_path = format!("{class_path}/cifMap {index}");
        if out.iter().any(|m| m.index == index) {
            self.diag(&map_path, "duplicate cifMap index; first wins");
            return;
        }

        let name = node
            .attr("name")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("CIF{index}"));

        let mut enables: [EnableBit; CIF_BITS] = Default::default();
        let mut defined: u32 = 0;

        // Reserve the slot before recursing so inline nested definitions see
        // this index as taken.
        out.push(CifMap { index, name, defined, enables: enables.clone() });
        let slot = out.len() - 1;

        for enable_node in node.children_named("cifEnable") {
            let Some(bit) = enable_node.attr_u32("index") else {
                self.diag(&map_path, "cifEnable has no index; dropped");
                continue;
            };
            if bit as usize >= CIF_BITS {
                self.diag(&map_path, format!("bit index {bit} out of range; entry dropped"));
                continue;
            }
            let bit = bit as u8;
            if defined & (1 << bit) != 0 {
                self.diag(
                    &format!("{map_path}/bit {bit}"),
                    "bit already bound; first wins",
                );
                continue;
            }
            let bit_path = format!("{map_path}/bit {bit}");

            let enable_name = match enable_node.attr("name").filter(|s| !s.is_empty()) {
                Some(name) => name.to_string(),
                None => {
                    self.diag(&bit_path, "enable has no name; synthesized from bit position");
                    format!("bit{bit}")
                },
            };
            let abbrev = enable_node
                .attr("abbrev")
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| sanitize(&enable_name));
            let path_id = format!("kestrel.cif{index}.{abbrev}");

            if let Some(nested) = enable_node.child_named("cifMap") {
                let Some(target) = nested.attr_u8("index") else {
                    self.diag(&bit_path, "linked cifMap has no index; link dropped");
                    continue;
                };
                enables[bit as usize] = EnableBit::Link(target);
                defined |= 1 << bit;
                // An inline definition carries enables of its own; a bare
                // reference does not.
                if nested.child_named("cifEnable").is_some() {
                    self.build_cif_map(nested, class_path, out);
                }
                continue;
            }

            let fields = self.build_group_fields(enable_node, &path_id, &bit_path, &enable_name);
            if fields.is_empty() {
                self.diag(&bit_path, "enable binds neither a link nor fields; left undefined");
                continue;
            }
            self.nodes += 1;
            enables[bit as usize] = EnableBit::Group(FieldGroup {
                name: enable_name,
                path_id,
                fields,
                note: parse_info(enable_node),
            });
            defined |= 1 << bit;
        }

        out[slot].defined = defined;
        out[slot].enables = enables;
    }

    /// Build the field list of one enable, falling back to the enable's own
    /// name for a single anonymous field.
    fn build_group_fields(
        &mut self,
        node: &MarkupNode,
        parent_path_id: &str,
        doc_path: &str,
        fallback_name: &str,
    ) -> Vec<FieldSpec> {
        let mut fields = Vec::new();
        for (ordinal, field_node) in node.children_named("field").enumerate() {
            if let Some(field) =
                self.build_field(field_node, parent_path_id, doc_path, Some(fallback_name), ordinal)
            {
                fields.push(field);
            }
        }
        fields
    }

    /// Build a plain field list (extension areas, array sections).
    fn build_fields(
        &mut self,
        node: &MarkupNode,
        parent_path_id: &str,
        doc_path: &str,
    ) -> Vec<FieldSpec> {
        let mut fields = Vec::new();
        for (ordinal, field_node) in node.children_named("field").enumerate() {
            if let Some(field) = self.build_field(field_node, parent_path_id, doc_path, None, ordinal)
            {
                fields.push(field);
            }
        }
        fields
    }

    fn build_field(
        &mut self,
        node: &MarkupNode,
        parent_path_id: &str,
        doc_path: &str,
        fallback_name: Option<&str>,
        ordinal: usize,
    ) -> Option<FieldSpec> {
        let name = match node.attr("name").filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => match fallback_name {
                Some(fallback) if ordinal == 0 => fallback.to_string(),
                _ => {
                    self.diag(doc_path, "field has no name; synthesized from position");
                    format!("field{ordinal}")
                },
            },
        };
        let abbrev = node
            .attr("abbrev")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| sanitize(&name));
        let path_id = format!("{parent_path_id}.{abbrev}");
        let field_path = format!("{doc_path}/field `{name}`");

        let bit_offset = match node.attr_u32("offset").unwrap_or(0).try_into() {
            Ok(offset) => offset,
            Err(_) => {
                self.diag(&field_path, "offset out of range; substituted 0");
                0
            },
        };
        let relative = node.attr_bool("relative").unwrap_or(false);

        let kind = self.build_kind(node, &path_id, &field_path)?;
        match &kind {
            FieldKind::Link { .. } => {},
            FieldKind::Array(_) => self.nodes += 1,
            _ => self.leaves += 1,
        }

        Some(FieldSpec {
            name,
            path_id,
            bit_offset,
            relative,
            kind,
            units: node.attr("units").map(str::to_string),
            note: parse_info(node),
        })
    }

    fn build_kind(
        &mut self,
        node: &MarkupNode,
        path_id: &str,
        field_path: &str,
    ) -> Option<FieldKind> {
        let width = |builder: &mut Self| -> u8 {
            match node.attr_u8("width") {
                Some(w) if (1..=64).contains(&w) => w,
                Some(w) => {
                    builder.diag(field_path, format!("width {w} out of range; substituted 32"));
                    32
                },
                None => 32,
            }
        };

        let kind = match node.attr("type") {
            Some("bool") => FieldKind::Bool,
            Some("int") => FieldKind::Int { width: width(self) },
            Some("uint") => FieldKind::UInt { width: width(self) },
            Some("hex") => FieldKind::Hex { width: width(self) },
            Some(t @ ("fixed" | "ufixed")) => {
                let width = width(self);
                let mut point = node.attr_u8("point").unwrap_or(0);
                if point > width {
                    self.diag(
                        field_path,
                        format!("binary point {point} exceeds width {width}; clamped"),
                    );
                    point = width;
                }
                let scale = node.attr_f64("scale").unwrap_or(1.0);
                if t == "fixed" {
                    FieldKind::Fixed { width, point, scale }
                } else {
                    FieldKind::UFixed { width, point, scale }
                }
            },
            Some("raw") => {
                let width = match node.attr_u32("width").unwrap_or(32).try_into() {
                    Ok(w) if w > 0 => w,
                    _ => {
                        self.diag(field_path, "raw width missing or out of range; substituted 32");
                        32
                    },
                };
                FieldKind::Raw { width }
            },
            Some("dynamic") => FieldKind::Dynamic { length_width: width(self) },
            Some("string") => FieldKind::Utf8 { length_width: width(self) },
            Some("enum") => {
                let width = width(self);
                let mut table = Vec::new();
                for entry in node.children_named("enum") {
                    let Some(value) = entry.attr_u64("value") else {
                        self.diag(field_path, "enum entry has no value; dropped");
                        continue;
                    };
                    let label = entry
                        .attr("label")
                        .map(str::to_string)
                        .or_else(|| entry.text.clone())
                        .unwrap_or_else(|| format!("{value}"));
                    table.push(EnumEntry { value, label });
                }
                FieldKind::Enum { width, table: EnumTable(table) }
            },
            Some("array") => {
                FieldKind::Array(Box::new(self.build_array(node, path_id, field_path)))
            },
            Some("link") => match node.attr_u8("target") {
                Some(target) => FieldKind::Link { target },
                None => {
                    self.diag(field_path, "link field has no target; field dropped");
                    return None;
                },
            },
            Some(unknown) => {
                self.diag(
                    field_path,
                    format!("unknown field type `{unknown}`; decoded as raw"),
                );
                FieldKind::Raw { width: 32 }
            },
            None => {
                self.diag(field_path, "field has no type; decoded as raw");
                FieldKind::Raw { width: 32 }
            },
        };
        Some(kind)
    }

    fn build_array(
        &mut self,
        node: &MarkupNode,
        path_id: &str,
        field_path: &str,
    ) -> RecordArraySpec {
        let mut spec = RecordArraySpec { index_width: 32, ..Default::default() };

        if let Some(index_node) = node.child_named("recordIndex") {
            spec.index_offset = Some(index_node.attr_u32("offset").unwrap_or(0) as u16);
            spec.index_width = match index_node.attr_u8("width") {
                Some(w) if (1..=64).contains(&w) => w,
                Some(w) => {
                    self.diag(field_path, format!("record index width {w} out of range; substituted 32"));
                    32
                },
                None => 32,
            };
        }

        self.build_array_side(
            node,
            "headerEnable",
            &format!("{path_id}.hdr"),
            field_path,
            &mut spec.required_header,
            &mut spec.header_sections,
            &mut spec.header_mask,
        );
        self.build_array_side(
            node,
            "recordEnable",
            &format!("{path_id}.rec"),
            field_path,
            &mut spec.required_record,
            &mut spec.record_sections,
            &mut spec.record_mask,
        );

        spec
    }

    /// Build one side (header or record) of an array spec. Enables without
    /// an index are required sections; their fields join the always-present
    /// list in document order.
    #[allow(clippy::too_many_arguments)]
    fn build_array_side(
        &mut self,
        node: &MarkupNode,
        element: &str,
        side_path_id: &str,
        field_path: &str,
        required: &mut Vec<FieldSpec>,
        sections: &mut [Option<RecordSection>; CIF_BITS],
        mask: &mut u32,
    ) {
        for enable_node in node.children_named(element) {
            let name = enable_node
                .attr("name")
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| element.to_string());
            let abbrev = enable_node
                .attr("abbrev")
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| sanitize(&name));
            let section_path_id = format!("{side_path_id}.{abbrev}");
            let doc_path = format!("{field_path}/{element} `{name}`");

            match enable_node.attr_u32("index") {
                None => {
                    let mut fields = self.build_fields(enable_node, &section_path_id, &doc_path);
                    required.append(&mut fields);
                },
                Some(bit) if (bit as usize) < CIF_BITS => {
                    if *mask & (1 << bit) != 0 {
                        self.diag(&doc_path, format!("section bit {bit} already bound; first wins"));
                        continue;
                    }
                    let fields = self.build_fields(enable_node, &section_path_id, &doc_path);
                    self.nodes += 1;
                    sections[bit as usize] =
                        Some(RecordSection { name, path_id: section_path_id, fields });
                    *mask |= 1 << bit;
                },
                Some(bit) => {
                    self.diag(&doc_path, format!("section bit {bit} out of range; entry dropped"));
                },
            }
        }
    }
}

/// Parse an `info` child into an annotation.
fn parse_info(node: &MarkupNode) -> Option<Annotation> {
    let info = node.child_named("info")?;
    let level = match info.attr("level") {
        Some("warn") => NoteLevel::Warn,
        Some("error") => NoteLevel::Error,
        _ => NoteLevel::Note,
    };
    let text = info
        .attr("string")
        .map(str::to_string)
        .or_else(|| info.text.clone())
        .unwrap_or_default();
    Some(Annotation { level, text })
}

/// Lowercase and squash non-alphanumerics for path segments.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() { "field".to_string() } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: &str) -> MarkupNode {
        MarkupNode::new("field").with_attr("name", name).with_attr("type", ty)
    }

    fn enable(bit: u32, name: &str) -> MarkupNode {
        MarkupNode::new("cifEnable")
            .with_attr("index", bit.to_string())
            .with_attr("name", name)
    }

    fn minimal_schema() -> MarkupNode {
        MarkupNode::new("schema").with_child(
            MarkupNode::new("class").with_attr("id", "0x100").with_child(
                MarkupNode::new("cifMap")
                    .with_attr("index", "0")
                    .with_child(enable(0, "Bandwidth").with_child(
                        field("Bandwidth", "uint").with_attr("width", "32"),
                    )),
            ),
        )
    }

    #[test]
    fn rejects_wrong_root() {
        let doc = MarkupNode::new("configuration");
        assert_eq!(
            SchemaBuilder::build(&doc),
            Err(SchemaError::NotASchema("configuration".to_string()))
        );
    }

    #[test]
    fn rejects_empty_document() {
        let doc = MarkupNode::new("schema");
        assert_eq!(SchemaBuilder::build(&doc), Err(SchemaError::NoClasses));
    }

    #[test]
    fn builds_minimal_class() {
        let schema = SchemaBuilder::build(&minimal_schema()).unwrap();
        assert_eq!(schema.classes.len(), 1);
        assert_eq!(schema.registrations.len(), 1);
        assert!(schema.diagnostics.is_empty());

        let map = schema.classes[0].cif_map(0).unwrap();
        assert!(map.is_defined(0));
        let EnableBit::Group(group) = map.enable(0) else {
            panic!("bit 0 should be a field group");
        };
        assert_eq!(group.fields.len(), 1);
        assert_eq!(group.fields[0].kind, FieldKind::UInt { width: 32 });
        assert_eq!(group.path_id, "kestrel.cif0.bandwidth");
    }

    #[test]
    fn unknown_field_type_defaults_to_raw() {
        let doc = MarkupNode::new("schema").with_child(
            MarkupNode::new("class").with_attr("id", "1").with_child(
                MarkupNode::new("cifMap")
                    .with_attr("index", "0")
                    .with_child(enable(3, "Mystery").with_child(field("Mystery", "quaternion"))),
            ),
        );
        let schema = SchemaBuilder::build(&doc).unwrap();
        assert_eq!(schema.diagnostics.len(), 1);
        assert!(schema.diagnostics[0].message.contains("quaternion"));

        let EnableBit::Group(group) = schema.classes[0].cif_map(0).unwrap().enable(3) else {
            panic!("bit 3 should be a field group");
        };
        assert_eq!(group.fields[0].kind, FieldKind::Raw { width: 32 });
    }

    #[test]
    fn out_of_range_bit_is_dropped() {
        let doc = MarkupNode::new("schema").with_child(
            MarkupNode::new("class").with_attr("id", "1").with_child(
                MarkupNode::new("cifMap")
                    .with_attr("index", "0")
                    .with_child(enable(32, "TooFar").with_child(field("TooFar", "bool")))
                    .with_child(enable(31, "Fine").with_child(field("Fine", "bool"))),
            ),
        );
        let schema = SchemaBuilder::build(&doc).unwrap();
        let map = schema.classes[0].cif_map(0).unwrap();
        assert_eq!(map.defined, 1 << 31);
        assert!(schema.diagnostics.iter().any(|d| d.message.contains("out of range")));
    }

    #[test]
    fn alias_copies_resolved_index() {
        let doc = MarkupNode::new("schema")
            .with_child(
                MarkupNode::new("class").with_attr("id", "0x100").with_child(
                    MarkupNode::new("cifMap")
                        .with_attr("index", "0")
                        .with_child(enable(0, "F").with_child(field("F", "bool"))),
                ),
            )
            .with_child(
                MarkupNode::new("class")
                    .with_attr("id", "0x200")
                    .with_attr("alias", "0x100"),
            );
        let schema = SchemaBuilder::build(&doc).unwrap();
        assert_eq!(schema.classes.len(), 1);
        assert_eq!(schema.registrations.len(), 2);
        assert_eq!(schema.registrations[0].class, schema.registrations[1].class);
    }

    #[test]
    fn alias_with_content_is_diagnosed() {
        let doc = MarkupNode::new("schema")
            .with_child(
                MarkupNode::new("class").with_attr("id", "0x100").with_child(
                    MarkupNode::new("cifMap")
                        .with_attr("index", "0")
                        .with_child(enable(0, "F").with_child(field("F", "bool"))),
                ),
            )
            .with_child(
                MarkupNode::new("class")
                    .with_attr("id", "0x200")
                    .with_attr("alias", "0x100")
                    .with_child(MarkupNode::new("cifMap").with_attr("index", "0")),
            );
        let schema = SchemaBuilder::build(&doc).unwrap();
        assert_eq!(schema.classes.len(), 1);
        assert!(schema
            .diagnostics
            .iter()
            .any(|d| d.message.contains("aliases and defines content")));
    }

    #[test]
    fn link_enable_binds_and_inline_map_is_hoisted() {
        let doc = MarkupNode::new("schema").with_child(
            MarkupNode::new("class").with_attr("id", "1").with_child(
                MarkupNode::new("cifMap")
                    .with_attr("index", "0")
                    .with_child(enable(0, "F").with_child(field("F", "bool")))
                    .with_child(
                        enable(7, "More").with_child(
                            MarkupNode::new("cifMap").with_attr("index", "1").with_child(
                                enable(2, "Gain").with_child(
                                    field("Gain", "fixed")
                                        .with_attr("width", "16")
                                        .with_attr("point", "7"),
                                ),
                            ),
                        ),
                    ),
            ),
        );
        let schema = SchemaBuilder::build(&doc).unwrap();
        let class = &schema.classes[0];
        assert_eq!(class.cif_maps.len(), 2);
        assert_eq!(class.cif_map(0).unwrap().enable(7), &EnableBit::Link(1));
        assert!(class.cif_map(1).unwrap().is_defined(2));
    }

    #[test]
    fn projected_counts_match_recount() {
        let array_field = field("Entries", "array")
            .with_child(
                MarkupNode::new("recordIndex").with_attr("offset", "0").with_attr("width", "8"),
            )
            .with_child(
                MarkupNode::new("headerEnable")
                    .with_attr("name", "Span")
                    .with_child(field("Span", "uint")),
            )
            .with_child(
                MarkupNode::new("recordEnable")
                    .with_attr("name", "Power")
                    .with_attr("index", "1")
                    .with_child(
                        field("Power", "fixed").with_attr("width", "16").with_attr("point", "6"),
                    ),
            );

        let doc = MarkupNode::new("schema").with_child(
            MarkupNode::new("class")
                .with_attr("id", "0x42")
                .with_child(
                    MarkupNode::new("cifMap")
                        .with_attr("index", "0")
                        .with_child(enable(0, "Table").with_child(array_field))
                        .with_child(enable(5, "Flag").with_child(field("Flag", "bool"))),
                )
                .with_child(
                    MarkupNode::new("extensionCamFields")
                        .with_attr("required", "true")
                        .with_child(field("UserBits", "hex").with_attr("width", "8")),
                ),
        );
        let schema = SchemaBuilder::build(&doc).unwrap();
        assert_eq!((schema.node_count, schema.leaf_count), schema.recount());
    }

    #[test]
    fn default_class_without_id_is_not_registered() {
        let doc = MarkupNode::new("schema").with_child(
            MarkupNode::new("class").with_attr("default", "true").with_child(
                MarkupNode::new("cifMap")
                    .with_attr("index", "0")
                    .with_child(enable(0, "F").with_child(field("F", "bool"))),
            ),
        );
        let schema = SchemaBuilder::build(&doc).unwrap();
        assert_eq!(schema.registrations.len(), 0);
        assert_eq!(schema.default_class, Some(0));
    }

    #[test]
    fn point_clamped_to_width() {
        let doc = MarkupNode::new("schema").with_child(
            MarkupNode::new("class").with_attr("id", "1").with_child(
                MarkupNode::new("cifMap").with_attr("index", "0").with_child(
                    enable(0, "Level").with_child(
                        field("Level", "ufixed").with_attr("width", "8").with_attr("point", "12"),
                    ),
                ),
            ),
        );
        let schema = SchemaBuilder::build(&doc).unwrap();
        let EnableBit::Group(group) = schema.classes[0].cif_map(0).unwrap().enable(0) else {
            panic!("bit 0 should be a field group");
        };
        assert_eq!(group.fields[0].kind, FieldKind::UFixed { width: 8, point: 8, scale: 1.0 });
        assert!(schema.diagnostics.iter().any(|d| d.message.contains("clamped")));
    }

    #[test]
    fn sanitize_path_segments() {
        assert_eq!(sanitize("Reference Level"), "reference_level");
        assert_eq!(sanitize("  IF  Band--Offset "), "if_band_offset");
        assert_eq!(sanitize("***"), "field");
    }
}
