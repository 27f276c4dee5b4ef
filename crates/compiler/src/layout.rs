//! Record layout computation
//!
//! Layout values live in linear memory; compiled values of layout type are
//! i32 pointers. Offsets are computed once, before any code is emitted, and
//! exposed to the host as the `__layouts` side table.
//!
//! Alignment rule: in a normal layout every field starts at the next multiple
//! of its own size (or its nested layout's alignment), and the final size is
//! padded up to the layout's alignment. In a `packed` layout alignment is 1
//! everywhere and no padding is inserted.

use crate::CompileError;
use crate::ast::{FieldType, LayoutDecl};
use crate::types::ValType;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LayoutField {
    pub offset: u32,
    pub size: u32,
    /// Scalar type of the field; nested layout fields carry `I32` here and
    /// the layout name in `nested`.
    pub ty: ValType,
    pub nested: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub fields: IndexMap<String, LayoutField>,
    pub size: u32,
    pub align: u32,
    pub packed: bool,
}

impl Layout {
    /// Host-visible offset table: field name to byte offset, plus the
    /// `__size` and `__align` pseudo-entries.
    pub fn offset_table(&self) -> IndexMap<String, u32> {
        let mut table: IndexMap<String, u32> = self
            .fields
            .iter()
            .map(|(name, f)| (name.clone(), f.offset))
            .collect();
        table.insert("__size".to_string(), self.size);
        table.insert("__align".to_string(), self.align);
        table
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    value.div_ceil(align) * align
}

/// Compute layouts in declaration order. Nested layouts must be declared
/// before the layouts that embed them.
pub fn compute_layouts<'a>(
    decls: impl Iterator<Item = &'a LayoutDecl>,
) -> Result<IndexMap<String, Layout>, CompileError> {
    let mut layouts: IndexMap<String, Layout> = IndexMap::new();

    for decl in decls {
        if layouts.contains_key(&decl.name) {
            return Err(CompileError::Semantic(format!(
                "duplicate layout '{}'",
                decl.name
            )));
        }

        let mut fields: IndexMap<String, LayoutField> = IndexMap::new();
        let mut cursor = 0u32;
        let mut max_align = 1u32;

        for field in &decl.fields {
            let (size, align, ty, nested) = match &field.ftype {
                FieldType::Scalar(t) => (t.size(), t.size(), *t, None),
                FieldType::Layout(name) => {
                    let inner = layouts.get(name).ok_or_else(|| {
                        CompileError::Semantic(format!(
                            "layout '{}' references unknown layout '{}'",
                            decl.name, name
                        ))
                    })?;
                    (inner.size, inner.align, ValType::I32, Some(name.clone()))
                }
            };
            let align = if decl.packed { 1 } else { align };
            let offset = round_up(cursor, align);
            if fields
                .insert(
                    field.name.clone(),
                    LayoutField {
                        offset,
                        size,
                        ty,
                        nested,
                    },
                )
                .is_some()
            {
                return Err(CompileError::Semantic(format!(
                    "duplicate field '{}' in layout '{}'",
                    field.name, decl.name
                )));
            }
            cursor = offset + size;
            max_align = max_align.max(align);
        }

        let align = if decl.packed { 1 } else { max_align };
        let size = round_up(cursor, align);
        layouts.insert(
            decl.name.clone(),
            Layout {
                fields,
                size,
                align,
                packed: decl.packed,
            },
        );
    }

    Ok(layouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LayoutFieldDecl;

    fn decl(name: &str, packed: bool, fields: &[(&str, FieldType)]) -> LayoutDecl {
        LayoutDecl {
            name: name.to_string(),
            packed,
            fields: fields
                .iter()
                .map(|(n, t)| LayoutFieldDecl {
                    name: n.to_string(),
                    ftype: t.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_sphere_layout_with_padding() {
        // cx/cy/cz/radius: f64, id: i32; final size padded to f64 alignment.
        let d = decl(
            "Sphere",
            false,
            &[
                ("cx", FieldType::Scalar(ValType::F64)),
                ("cy", FieldType::Scalar(ValType::F64)),
                ("cz", FieldType::Scalar(ValType::F64)),
                ("radius", FieldType::Scalar(ValType::F64)),
                ("id", FieldType::Scalar(ValType::I32)),
            ],
        );
        let layouts = compute_layouts([d].iter()).unwrap();
        let sphere = &layouts["Sphere"];
        assert_eq!(sphere.fields["cx"].offset, 0);
        assert_eq!(sphere.fields["cy"].offset, 8);
        assert_eq!(sphere.fields["cz"].offset, 16);
        assert_eq!(sphere.fields["radius"].offset, 24);
        assert_eq!(sphere.fields["id"].offset, 32);
        assert_eq!(sphere.size, 40);
        assert_eq!(sphere.align, 8);
    }

    #[test]
    fn test_alignment_gap_before_wider_field() {
        let d = decl(
            "Mixed",
            false,
            &[
                ("flag", FieldType::Scalar(ValType::I32)),
                ("value", FieldType::Scalar(ValType::F64)),
            ],
        );
        let layouts = compute_layouts([d].iter()).unwrap();
        let mixed = &layouts["Mixed"];
        assert_eq!(mixed.fields["flag"].offset, 0);
        assert_eq!(mixed.fields["value"].offset, 8);
        assert_eq!(mixed.size, 16);
    }

    #[test]
    fn test_packed_layout_no_padding() {
        let d = decl(
            "Packed",
            true,
            &[
                ("flag", FieldType::Scalar(ValType::I32)),
                ("value", FieldType::Scalar(ValType::F64)),
                ("tail", FieldType::Scalar(ValType::I32)),
            ],
        );
        let layouts = compute_layouts([d].iter()).unwrap();
        let packed = &layouts["Packed"];
        assert_eq!(packed.fields["flag"].offset, 0);
        assert_eq!(packed.fields["value"].offset, 4);
        assert_eq!(packed.fields["tail"].offset, 12);
        assert_eq!(packed.size, 16);
        assert_eq!(packed.align, 1);
    }

    #[test]
    fn test_offsets_monotonic_and_aligned() {
        let d = decl(
            "M",
            false,
            &[
                ("a", FieldType::Scalar(ValType::I32)),
                ("b", FieldType::Scalar(ValType::I64)),
                ("c", FieldType::Scalar(ValType::F32)),
                ("d", FieldType::Scalar(ValType::F64)),
            ],
        );
        let layouts = compute_layouts([d].iter()).unwrap();
        let m = &layouts["M"];
        let fields: Vec<&LayoutField> = m.fields.values().collect();
        for pair in fields.windows(2) {
            assert!(pair[0].offset + pair[0].size <= pair[1].offset);
        }
        for f in &fields {
            assert_eq!(f.offset % f.size, 0);
        }
    }

    #[test]
    fn test_nested_layout() {
        let inner = decl(
            "Point",
            false,
            &[
                ("x", FieldType::Scalar(ValType::F64)),
                ("y", FieldType::Scalar(ValType::F64)),
            ],
        );
        let outer = decl(
            "Segment",
            false,
            &[
                ("tag", FieldType::Scalar(ValType::I32)),
                ("a", FieldType::Layout("Point".to_string())),
                ("b", FieldType::Layout("Point".to_string())),
            ],
        );
        let layouts = compute_layouts([inner, outer].iter()).unwrap();
        let seg = &layouts["Segment"];
        assert_eq!(seg.fields["tag"].offset, 0);
        // Nested Point aligns to its own 8-byte alignment.
        assert_eq!(seg.fields["a"].offset, 8);
        assert_eq!(seg.fields["b"].offset, 24);
        assert_eq!(seg.size, 40);
        assert_eq!(seg.align, 8);
    }

    #[test]
    fn test_unknown_nested_layout_fails() {
        let d = decl("Bad", false, &[("p", FieldType::Layout("Nope".to_string()))]);
        assert!(compute_layouts([d].iter()).is_err());
    }

    #[test]
    fn test_offset_table_has_pseudo_entries() {
        let d = decl("T", false, &[("x", FieldType::Scalar(ValType::F64))]);
        let layouts = compute_layouts([d].iter()).unwrap();
        let table = layouts["T"].offset_table();
        assert_eq!(table["x"], 0);
        assert_eq!(table["__size"], 8);
        assert_eq!(table["__align"], 8);
    }
}
