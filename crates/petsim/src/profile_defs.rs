use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use crate::config::UniformRange;
use crate::profile::{PetProfile, ProfileTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileDefErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInFile,
}

#[derive(Debug, Clone)]
pub struct ProfileDefError {
    pub code: ProfileDefErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ProfileDefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ProfileDefError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDef {
    pub def_name: String,
    pub profile: PetProfile,
}

/// Loads every `*.xml` file directly under `dir` (sorted by file name) into
/// `table`. Later files override earlier definitions of the same name.
pub fn load_profile_defs(dir: &Path, table: &mut ProfileTable) -> Result<usize, ProfileDefError> {
    let mut files = fs::read_dir(dir)
        .map_err(|source| read_error(dir, source))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| read_error(dir, source))?;
    files.retain(|path| {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
    });
    files.sort();

    let mut loaded = 0usize;
    for file in files {
        let raw = fs::read_to_string(&file).map_err(|source| read_error(&file, source))?;
        for def in parse_profile_defs(&file, &raw)? {
            table.insert(&def.def_name, def.profile);
            loaded += 1;
        }
    }
    info!(dir = %dir.display(), loaded, "profile_defs_loaded");
    Ok(loaded)
}

pub fn parse_profile_defs(file_path: &Path, raw: &str) -> Result<Vec<ProfileDef>, ProfileDefError> {
    let doc = Document::parse(raw).map_err(|error| ProfileDefError {
        code: ProfileDefErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ProfileDefErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut seen_names = HashSet::<String>::new();
    let mut defs = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "PetProfileDef" {
            return Err(error_at_node(
                ProfileDefErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; expected <PetProfileDef>",
                    child.tag_name().name()
                ),
                file_path,
                &doc,
                child,
            ));
        }
        let def = parse_profile_def(file_path, &doc, child)?;
        if !seen_names.insert(def.def_name.clone()) {
            return Err(error_at_node(
                ProfileDefErrorCode::DuplicateDefInFile,
                format!("duplicate PetProfileDef '{}' in one file", def.def_name),
                file_path,
                &doc,
                child,
            ));
        }
        defs.push(def);
    }
    Ok(defs)
}

fn parse_profile_def(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<ProfileDef, ProfileDefError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut speed_min: Option<f32> = None;
    let mut speed_max: Option<f32> = None;
    let mut profile = PetProfile::default();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                ProfileDefErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <PetProfileDef>"),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "defName" => def_name = Some(required_text(file_path, doc, field, "defName")?),
            "speedMin" => speed_min = Some(non_negative(file_path, doc, field, "speedMin")?),
            "speedMax" => speed_max = Some(non_negative(file_path, doc, field, "speedMax")?),
            "footRatio" => {
                profile.foot_ratio = unit_interval(file_path, doc, field, "footRatio")?;
            }
            "shadowRatio" => {
                profile.shadow_ratio = positive(file_path, doc, field, "shadowRatio")?;
            }
            "scale" => profile.scale = positive(file_path, doc, field, "scale")?,
            "bandTop" => profile.band_top = unit_interval(file_path, doc, field, "bandTop")?,
            "bandBottom" => {
                profile.band_bottom = unit_interval(file_path, doc, field, "bandBottom")?;
            }
            "castsShadow" => {
                let value = required_text(file_path, doc, field, "castsShadow")?;
                profile.casts_shadow = match value.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(error_at_node(
                            ProfileDefErrorCode::InvalidValue,
                            format!("castsShadow '{value}' must be true or false"),
                            file_path,
                            doc,
                            field,
                        ))
                    }
                };
            }
            _ => {
                return Err(error_at_node(
                    ProfileDefErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <PetProfileDef>"),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(error_at_node(
            ProfileDefErrorCode::MissingField,
            "missing required field <defName> in <PetProfileDef>".to_string(),
            file_path,
            doc,
            node,
        ));
    };

    profile.speed_range = match (speed_min, speed_max) {
        (Some(min), Some(max)) if max >= min => Some(UniformRange::new(min, max)),
        (None, None) => None,
        (Some(_), Some(_)) => {
            return Err(error_at_node(
                ProfileDefErrorCode::InvalidValue,
                format!("speedMax must be >= speedMin in '{def_name}'"),
                file_path,
                doc,
                node,
            ))
        }
        _ => {
            return Err(error_at_node(
                ProfileDefErrorCode::MissingField,
                format!("'{def_name}' must set both <speedMin> and <speedMax> or neither"),
                file_path,
                doc,
                node,
            ))
        }
    };

    if profile.band_bottom <= profile.band_top {
        return Err(error_at_node(
            ProfileDefErrorCode::InvalidValue,
            format!("bandBottom must be greater than bandTop in '{def_name}'"),
            file_path,
            doc,
            node,
        ));
    }

    Ok(ProfileDef { def_name, profile })
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ProfileDefError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            ProfileDefErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn parse_number(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<f32, ProfileDefError> {
    let value = required_text(file_path, doc, node, field_name)?;
    match value.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(error_at_node(
            ProfileDefErrorCode::InvalidValue,
            format!("{field_name} '{value}' is not a valid finite number"),
            file_path,
            doc,
            node,
        )),
    }
}

fn non_negative(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<f32, ProfileDefError> {
    let value = parse_number(file_path, doc, node, field_name)?;
    if value < 0.0 {
        return Err(error_at_node(
            ProfileDefErrorCode::InvalidValue,
            format!("{field_name} must be >= 0"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn positive(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<f32, ProfileDefError> {
    let value = parse_number(file_path, doc, node, field_name)?;
    if value <= 0.0 {
        return Err(error_at_node(
            ProfileDefErrorCode::InvalidValue,
            format!("{field_name} must be > 0"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn unit_interval(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<f32, ProfileDefError> {
    let value = parse_number(file_path, doc, node, field_name)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(error_at_node(
            ProfileDefErrorCode::InvalidValue,
            format!("{field_name} must be within [0, 1]"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: ProfileDefErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ProfileDefError {
    let pos = doc.text_pos_at(node.range().start);
    ProfileDefError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

fn read_error(path: &Path, source: std::io::Error) -> ProfileDefError {
    ProfileDefError {
        code: ProfileDefErrorCode::ReadFile,
        message: format!("failed to read: {source}"),
        file_path: path.to_path_buf(),
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PetKind;

    fn parse(raw: &str) -> Result<Vec<ProfileDef>, ProfileDefError> {
        parse_profile_defs(Path::new("profiles.xml"), raw)
    }

    #[test]
    fn parses_full_profile_def() {
        let defs = parse(
            r#"<Defs>
                <PetProfileDef>
                    <defName>slime</defName>
                    <speedMin>0.1</speedMin>
                    <speedMax>0.2</speedMax>
                    <footRatio>0.99</footRatio>
                    <shadowRatio>1.1</shadowRatio>
                    <scale>0.5</scale>
                    <bandTop>0.6</bandTop>
                    <bandBottom>1.0</bandBottom>
                    <castsShadow>false</castsShadow>
                </PetProfileDef>
            </Defs>"#,
        )
        .expect("parse");
        assert_eq!(defs.len(), 1);
        let profile = defs[0].profile;
        assert_eq!(defs[0].def_name, "slime");
        assert_eq!(profile.speed_range, Some(UniformRange::new(0.1, 0.2)));
        assert_eq!(profile.foot_ratio, 0.99);
        assert_eq!(profile.shadow_ratio, 1.1);
        assert!(!profile.casts_shadow);
    }

    #[test]
    fn omitted_fields_use_default_profile_values() {
        let defs = parse("<Defs><PetProfileDef><defName>blob</defName></PetProfileDef></Defs>")
            .expect("parse");
        assert_eq!(defs[0].profile, PetProfile::default());
    }

    #[test]
    fn rejects_unknown_field_with_location() {
        let error = parse(
            "<Defs>\n<PetProfileDef>\n<defName>x</defName>\n<wings>2</wings>\n</PetProfileDef>\n</Defs>",
        )
        .expect_err("unknown field");
        assert_eq!(error.code, ProfileDefErrorCode::UnknownField);
        assert_eq!(error.location.map(|loc| loc.line), Some(4));
    }

    #[test]
    fn rejects_half_specified_speed_range() {
        let error = parse(
            "<Defs><PetProfileDef><defName>x</defName><speedMin>1</speedMin></PetProfileDef></Defs>",
        )
        .expect_err("half range");
        assert_eq!(error.code, ProfileDefErrorCode::MissingField);
    }

    #[test]
    fn rejects_out_of_range_foot_ratio() {
        let error = parse(
            "<Defs><PetProfileDef><defName>x</defName><footRatio>1.5</footRatio></PetProfileDef></Defs>",
        )
        .expect_err("ratio");
        assert_eq!(error.code, ProfileDefErrorCode::InvalidValue);
    }

    #[test]
    fn rejects_wrong_root_and_malformed_xml() {
        assert_eq!(
            parse("<Profiles/>").expect_err("root").code,
            ProfileDefErrorCode::InvalidRoot
        );
        assert_eq!(
            parse("<Defs><PetProfileDef>").expect_err("malformed").code,
            ProfileDefErrorCode::XmlMalformed
        );
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("a_base.xml"),
            "<Defs><PetProfileDef><defName>cat</defName><footRatio>0.5</footRatio></PetProfileDef></Defs>",
        )
        .expect("write");
        fs::write(
            dir.path().join("b_mod.xml"),
            "<Defs><PetProfileDef><defName>cat</defName><footRatio>0.6</footRatio></PetProfileDef></Defs>",
        )
        .expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let mut table = ProfileTable::builtin();
        let loaded = load_profile_defs(dir.path(), &mut table).expect("load");

        assert_eq!(loaded, 2);
        assert_eq!(table.resolve(&PetKind::new("cat")).foot_ratio, 0.6);
    }

    #[test]
    fn missing_directory_is_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut table = ProfileTable::builtin();
        let error = load_profile_defs(&dir.path().join("nope"), &mut table).expect_err("missing");
        assert_eq!(error.code, ProfileDefErrorCode::ReadFile);
        assert!(error.location.is_none());
    }
}
