use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

pub const SUPPORTED_KIT_SCHEMA_VERSION: i64 = 1;
const MAX_TRIANGLE_COUNT: f64 = 2_147_483_647.0;

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub enum KitErrorCode {
    #[serde(rename = "E1001")]
    InvalidJson,
    #[serde(rename = "E1002")]
    MissingField,
    #[serde(rename = "E1003")]
    InvalidFieldType,
    #[serde(rename = "E1004")]
    InvalidFieldValue,
    #[serde(rename = "E1005")]
    FileReadError,
}

impl KitErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "E1001",
            Self::MissingField => "E1002",
            Self::InvalidFieldType => "E1003",
            Self::InvalidFieldValue => "E1004",
            Self::FileReadError => "E1005",
        }
    }
}

impl fmt::Display for KitErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured kit-file parse failure.
#[derive(Debug, Clone, Serialize, thiserror::Error, Eq, PartialEq)]
#[error("[AgentGate][Error] code={code} file={file} field={field} reason={reason} hint={hint}{}", detail_suffix(.detail))]
pub struct KitParseError {
    pub code: KitErrorCode,
    pub file: String,
    pub field: String,
    pub reason: String,
    pub hint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" detail={detail}")
    }
}

impl KitParseError {
    fn new(code: KitErrorCode, file: &str, field: &str, reason: &str, hint: &str) -> Self {
        Self {
            code,
            file: file.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
            hint: hint.to_string(),
            detail: String::new(),
        }
    }

    fn missing(file: &str, field: &str, hint: &str) -> Self {
        Self::new(KitErrorCode::MissingField, file, field, "Missing required field", hint)
    }

    fn wrong_type(file: &str, field: &str, hint: &str) -> Self {
        Self::new(KitErrorCode::InvalidFieldType, file, field, "Invalid field type", hint)
    }
}

/// Normalized content of one ability-kit source file.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ParsedKit {
    pub schema_version: i64,
    pub id: String,
    pub display_name: String,
    pub damage: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub representing_mesh_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triangle_count_lod0_expected: Option<u32>,
}

/// Read and parse the kit file at `path`.
///
/// # Errors
/// Returns `E1005` when the file cannot be read, otherwise any error from
/// [`parse_kit_json`].
pub fn parse_kit_file(path: &Path) -> Result<ParsedKit, KitParseError> {
    let file = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|err| {
        let mut error = KitParseError::new(
            KitErrorCode::FileReadError,
            &file,
            "file",
            "Source file is missing or unreadable",
            "Verify file path, encoding and read permission",
        );
        error.detail = err.to_string();
        error
    })?;
    parse_kit_json(&text, &file)
}

/// Parse kit JSON text; `file` is only used for error reporting.
///
/// # Errors
/// Returns the first structural problem found, in field order.
pub fn parse_kit_json(text: &str, file: &str) -> Result<ParsedKit, KitParseError> {
    let root = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(root)) => root,
        Ok(_) => {
            return Err(KitParseError::new(
                KitErrorCode::InvalidJson,
                file,
                "root",
                "Invalid JSON format",
                "Top-level value must be a JSON object",
            ))
        }
        Err(err) => {
            let mut error = KitParseError::new(
                KitErrorCode::InvalidJson,
                file,
                "root",
                "Invalid JSON format",
                "Validate JSON syntax and remove trailing commas",
            );
            error.detail = err.to_string();
            return Err(error);
        }
    };

    let schema_version = match root.get("schema_version") {
        None => {
            return Err(KitParseError::missing(
                file,
                "schema_version",
                "Add integer field schema_version",
            ))
        }
        Some(value) => value.as_f64().ok_or_else(|| {
            KitParseError::wrong_type(file, "schema_version", "schema_version must be an integer")
        })?,
    };
    #[allow(clippy::cast_possible_truncation)]
    let schema_version = schema_version.trunc() as i64;
    if schema_version != SUPPORTED_KIT_SCHEMA_VERSION {
        return Err(KitParseError::new(
            KitErrorCode::InvalidFieldValue,
            file,
            "schema_version",
            &format!("Unsupported schema_version: {schema_version}"),
            "Use schema_version = 1",
        ));
    }

    let id = required_string(&root, file, "id", "Add non-empty string field id", "id must be a string")?;
    if id.is_empty() {
        return Err(KitParseError::new(
            KitErrorCode::InvalidFieldValue,
            file,
            "id",
            "Invalid field value",
            "id must be a non-empty string",
        ));
    }
    let display_name = required_string(
        &root,
        file,
        "display_name",
        "Add string field display_name",
        "display_name must be a string",
    )?;

    let representing_mesh_path = match root.get("representing_mesh") {
        None => String::new(),
        Some(Value::String(path)) => path.clone(),
        Some(_) => {
            return Err(KitParseError::wrong_type(
                file,
                "representing_mesh",
                "representing_mesh must be a string",
            ))
        }
    };

    let params = match root.get("params") {
        None => return Err(KitParseError::missing(file, "params", "Add object field params")),
        Some(Value::Object(params)) => params,
        Some(_) => {
            return Err(KitParseError::wrong_type(file, "params", "params must be an object"))
        }
    };
    let damage = match params.get("damage") {
        None => {
            return Err(KitParseError::missing(
                file,
                "params.damage",
                "Add numeric field params.damage",
            ))
        }
        Some(value) => value.as_f64().ok_or_else(|| {
            KitParseError::wrong_type(file, "params.damage", "params.damage must be a number")
        })?,
    };
    let triangle_count_lod0_expected = match params.get("triangle_count_lod0") {
        None => None,
        Some(value) => Some(parse_triangle_count(value, file)?),
    };

    Ok(ParsedKit {
        schema_version,
        id,
        display_name,
        damage,
        representing_mesh_path,
        triangle_count_lod0_expected,
    })
}

fn required_string(
    root: &Map<String, Value>,
    file: &str,
    field: &str,
    missing_hint: &str,
    type_hint: &str,
) -> Result<String, KitParseError> {
    match root.get(field) {
        None => Err(KitParseError::missing(file, field, missing_hint)),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(KitParseError::wrong_type(file, field, type_hint)),
    }
}

fn parse_triangle_count(value: &Value, file: &str) -> Result<u32, KitParseError> {
    const FIELD: &str = "params.triangle_count_lod0";
    let raw = value.as_f64().ok_or_else(|| {
        KitParseError::wrong_type(file, FIELD, "params.triangle_count_lod0 must be a number")
    })?;
    if !(0.0..=MAX_TRIANGLE_COUNT).contains(&raw) {
        return Err(KitParseError::new(
            KitErrorCode::InvalidFieldValue,
            file,
            FIELD,
            "Invalid field value",
            "params.triangle_count_lod0 must be >= 0 and <= 2147483647",
        ));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = raw.round() as u32;
    Ok(rounded)
}

/// Kits parsed from a directory, keyed by their file path.
#[derive(Debug, Default)]
pub struct KitDirectory {
    pub kits: Vec<(String, ParsedKit)>,
    pub failures: Vec<KitParseError>,
}

/// Parse every `*.json` file directly inside `dir`, in file-name order.
///
/// # Errors
/// Returns an `E1005` error when the directory itself cannot be listed.
pub fn load_kit_directory(dir: &Path) -> Result<KitDirectory, KitParseError> {
    let list_error = |detail: String| {
        let mut error = KitParseError::new(
            KitErrorCode::FileReadError,
            &dir.display().to_string(),
            "file",
            "Kit directory is missing or unreadable",
            "Pass an existing directory of *.json kit files",
        );
        error.detail = detail;
        error
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|err| list_error(err.to_string()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut directory = KitDirectory::default();
    for path in paths {
        match parse_kit_file(&path) {
            Ok(kit) => directory.kits.push((path.display().to_string(), kit)),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparsable kit file");
                directory.failures.push(err);
            }
        }
    }
    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParsedKit, KitParseError> {
        parse_kit_json(text, "Ability_01.json")
    }

    fn code_and_field(text: &str) -> (KitErrorCode, String) {
        match parse(text) {
            Ok(kit) => panic!("test failure: expected error, got {kit:?}"),
            Err(err) => (err.code, err.field),
        }
    }

    #[test]
    fn parses_full_kit() {
        let kit = match parse(
            r#"{"schema_version": 1, "id": "fire_01", "display_name": "Fireball",
                "representing_mesh": "/Game/Seed/SM_Rock.SM_Rock",
                "params": {"damage": 150.5, "triangle_count_lod0": 1200.4}}"#,
        ) {
            Ok(kit) => kit,
            Err(err) => panic!("test failure: {err}"),
        };
        assert_eq!(kit.id, "fire_01");
        assert!((kit.damage - 150.5).abs() < f64::EPSILON);
        assert_eq!(kit.representing_mesh_path, "/Game/Seed/SM_Rock.SM_Rock");
        assert_eq!(kit.triangle_count_lod0_expected, Some(1200));
    }

    #[test]
    fn error_codes_follow_field_order() {
        assert_eq!(code_and_field("{"), (KitErrorCode::InvalidJson, "root".to_string()));
        assert_eq!(code_and_field("[]"), (KitErrorCode::InvalidJson, "root".to_string()));
        assert_eq!(
            code_and_field(r#"{"id": "a"}"#),
            (KitErrorCode::MissingField, "schema_version".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": "1"}"#),
            (KitErrorCode::InvalidFieldType, "schema_version".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": 2}"#),
            (KitErrorCode::InvalidFieldValue, "schema_version".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": 1, "id": 7}"#),
            (KitErrorCode::InvalidFieldType, "id".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": 1, "id": ""}"#),
            (KitErrorCode::InvalidFieldValue, "id".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": 1, "id": "a"}"#),
            (KitErrorCode::MissingField, "display_name".to_string())
        );
        assert_eq!(
            code_and_field(
                r#"{"schema_version": 1, "id": "a", "display_name": "A", "representing_mesh": 3}"#
            ),
            (KitErrorCode::InvalidFieldType, "representing_mesh".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": 1, "id": "a", "display_name": "A", "params": []}"#),
            (KitErrorCode::InvalidFieldType, "params".to_string())
        );
        assert_eq!(
            code_and_field(r#"{"schema_version": 1, "id": "a", "display_name": "A", "params": {}}"#),
            (KitErrorCode::MissingField, "params.damage".to_string())
        );
        assert_eq!(
            code_and_field(
                r#"{"schema_version": 1, "id": "a", "display_name": "A", "params": {"damage": 1, "triangle_count_lod0": -1}}"#
            ),
            (KitErrorCode::InvalidFieldValue, "params.triangle_count_lod0".to_string())
        );
    }

    #[test]
    fn display_matches_contract_line() {
        let err = match parse(r#"{"schema_version": 1, "id": "a"}"#) {
            Ok(kit) => panic!("test failure: expected error, got {kit:?}"),
            Err(err) => err,
        };
        assert_eq!(
            err.to_string(),
            "[AgentGate][Error] code=E1002 file=Ability_01.json field=display_name reason=Missing required field hint=Add string field display_name"
        );

        let invalid = match parse("{") {
            Ok(kit) => panic!("test failure: expected error, got {kit:?}"),
            Err(err) => err,
        };
        assert!(invalid.to_string().contains(" detail="));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let path = std::env::temp_dir().join(format!("agent-gate-kit-{}.json", ulid::Ulid::new()));
        let err = parse_kit_file(&path).err();
        assert_eq!(err.map(|err| err.code), Some(KitErrorCode::FileReadError));
    }

    #[test]
    fn directory_load_separates_failures() {
        let dir = std::env::temp_dir().join(format!("agent-gate-kits-{}", ulid::Ulid::new()));
        if let Err(err) = fs::create_dir_all(&dir) {
            panic!("test failure: {err}");
        }
        let write = |name: &str, body: &str| {
            if let Err(err) = fs::write(dir.join(name), body) {
                panic!("test failure: {err}");
            }
        };
        write(
            "b_ice.json",
            r#"{"schema_version": 1, "id": "ice_02", "display_name": "Frost Nova", "params": {"damage": 90}}"#,
        );
        write("a_broken.json", "{");
        write("notes.txt", "ignored");

        let loaded = match load_kit_directory(&dir) {
            Ok(loaded) => loaded,
            Err(err) => panic!("test failure: {err}"),
        };
        assert_eq!(loaded.kits.len(), 1);
        assert_eq!(loaded.kits[0].1.id, "ice_02");
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].code, KitErrorCode::InvalidJson);
        let _ = fs::remove_dir_all(&dir);
    }
}
