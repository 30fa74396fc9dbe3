//! Building blocks of the Delta `MERGE` behind [`upsert`](crate::write::upsert).
//!
//! The target table is aliased `target` and the incoming data `source`.

use fabric_common::error::{FabricError, FabricResult};

pub const SOURCE_ALIAS: &str = "source";
pub const TARGET_ALIAS: &str = "target";

/// A list of column names, built from a single name, a list, or nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns(Vec<String>);

impl Columns {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Columns {
    fn from(column: &str) -> Self {
        Self(vec![column.to_string()])
    }
}

impl From<String> for Columns {
    fn from(column: String) -> Self {
        Self(vec![column])
    }
}

impl From<&String> for Columns {
    fn from(column: &String) -> Self {
        Self(vec![column.clone()])
    }
}

impl From<Vec<String>> for Columns {
    fn from(columns: Vec<String>) -> Self {
        Self(columns)
    }
}

impl From<Vec<&str>> for Columns {
    fn from(columns: Vec<&str>) -> Self {
        Self(columns.into_iter().map(String::from).collect())
    }
}

impl From<&[String]> for Columns {
    fn from(columns: &[String]) -> Self {
        Self(columns.to_vec())
    }
}

impl From<&[&str]> for Columns {
    fn from(columns: &[&str]) -> Self {
        Self(columns.iter().map(|c| c.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Columns {
    fn from(columns: [&str; N]) -> Self {
        Self(columns.iter().map(|c| c.to_string()).collect())
    }
}

impl<const N: usize> From<&[&str; N]> for Columns {
    fn from(columns: &[&str; N]) -> Self {
        Self(columns.iter().map(|c| c.to_string()).collect())
    }
}

impl<T: Into<Columns>> From<Option<T>> for Columns {
    fn from(columns: Option<T>) -> Self {
        columns.map(Into::into).unwrap_or_default()
    }
}

/// Normalizes a column specification to a list of names.
///
/// ```
/// use fabric_utilities::write::merge::normalize_columns;
///
/// assert!(normalize_columns(None::<&str>).is_empty());
/// assert_eq!(normalize_columns("single_column"), vec!["single_column"]);
/// assert_eq!(normalize_columns(vec!["col1", "col2"]), vec!["col1", "col2"]);
/// assert!(normalize_columns(Vec::<String>::new()).is_empty());
/// ```
pub fn normalize_columns(columns: impl Into<Columns>) -> Vec<String> {
    columns.into().into_inner()
}

/// Checks that every column in `columns` is one of the `available` columns.
///
/// ```
/// use fabric_utilities::write::merge::validate_columns_exist;
///
/// let available = ["a", "b", "c"].map(String::from);
/// assert!(validate_columns_exist(&available, &["a", "b"], "Test").is_ok());
/// assert!(validate_columns_exist(&available, &[] as &[&str], "Test").is_ok());
///
/// let error = validate_columns_exist(&available, &["a", "missing"], "Test").unwrap_err();
/// assert!(error.to_string().contains("Test columns [\"missing\"] not found"));
/// ```
pub fn validate_columns_exist<S: AsRef<str>>(
    available: &[String],
    columns: &[S],
    column_type: &str,
) -> FabricResult<()> {
    let missing = columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|column| !available.iter().any(|a| a.as_str() == *column))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FabricError::invalid(format!(
            "{column_type} columns {missing:?} not found in data. Available columns: {available:?}"
        )))
    }
}

/// Builds the predicate that matches source rows to target rows.
///
/// ```
/// use fabric_utilities::write::merge::build_merge_predicate;
///
/// assert_eq!(build_merge_predicate(&["id"]), "target.id = source.id");
/// assert_eq!(
///     build_merge_predicate(&["id", "name"]),
///     "target.id = source.id AND target.name = source.name"
/// );
/// assert_eq!(build_merge_predicate(&[] as &[&str]), "");
/// ```
pub fn build_merge_predicate<S: AsRef<str>>(primary_key_columns: &[S]) -> String {
    primary_key_columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            format!("{TARGET_ALIAS}.{column} = {SOURCE_ALIAS}.{column}")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Selects the columns whose changes cause a matched row to be updated.
///
/// ```
/// use fabric_utilities::write::merge::get_predicate_update_columns;
///
/// assert_eq!(
///     get_predicate_update_columns(
///         &["id", "name", "email", "created_at", "updated_at"],
///         &["id"],
///         &["created_at"],
///         &["updated_at"],
///     ),
///     vec!["name", "email"]
/// );
/// assert_eq!(get_predicate_update_columns(&["a", "b"], &["a"], &[], &[]), vec!["b"]);
/// assert!(get_predicate_update_columns(&["a"], &["a"], &[], &[]).is_empty());
/// ```
pub fn get_predicate_update_columns<S: AsRef<str>>(
    columns: &[S],
    primary_key_columns: &[S],
    predicate_exclusion_columns: &[S],
    update_exclusion_columns: &[S],
) -> Vec<String> {
    columns_except(
        columns,
        &[
            primary_key_columns,
            predicate_exclusion_columns,
            update_exclusion_columns,
        ],
    )
}

/// Builds the condition under which a matched row is updated: every one of
/// the given columns differs between target and source, with nulls compared
/// as values.
///
/// ```
/// use fabric_utilities::write::merge::build_update_predicate;
///
/// let predicate = build_update_predicate(&["name"]);
/// assert!(predicate.contains("target.name != source.name"));
/// assert!(predicate.contains("target.name IS NULL AND source.name IS NOT NULL"));
/// assert!(predicate.contains("target.name IS NOT NULL AND source.name IS NULL"));
///
/// let predicate = build_update_predicate(&["name", "email"]);
/// assert!(predicate.contains("target.name != source.name"));
/// assert!(predicate.contains("target.email != source.email"));
/// assert_eq!(predicate.matches("target.name").count(), 3);
/// assert_eq!(predicate.matches("target.email").count(), 3);
/// assert!(predicate.contains(") AND ("));
///
/// assert_eq!(build_update_predicate(&[] as &[&str]), "");
/// ```
pub fn build_update_predicate<S: AsRef<str>>(predicate_update_columns: &[S]) -> String {
    predicate_update_columns
        .iter()
        .map(|column| {
            let t = format!("{TARGET_ALIAS}.{}", column.as_ref());
            let s = format!("{SOURCE_ALIAS}.{}", column.as_ref());
            format!(
                "({t} != {s} OR {t} IS NULL AND {s} IS NOT NULL OR {t} IS NOT NULL AND {s} IS NULL)"
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Selects the columns that a matched row takes from the source.
///
/// ```
/// use fabric_utilities::write::merge::get_update_columns;
///
/// assert_eq!(
///     get_update_columns(&["id", "name", "email", "updated_at"], &["id"], &["updated_at"]),
///     vec!["name", "email"]
/// );
/// assert_eq!(get_update_columns(&["a", "b", "c"], &["a"], &[]), vec!["b", "c"]);
/// assert!(get_update_columns(&["a"], &["a"], &[]).is_empty());
/// ```
pub fn get_update_columns<S: AsRef<str>>(
    columns: &[S],
    primary_key_columns: &[S],
    update_exclusion_columns: &[S],
) -> Vec<String> {
    columns_except(columns, &[primary_key_columns, update_exclusion_columns])
}

/// Maps each updated target column to its source column.
///
/// ```
/// use fabric_utilities::write::merge::build_update_mapping;
///
/// assert_eq!(
///     build_update_mapping(&["name", "email"]),
///     vec![
///         ("target.name".to_string(), "source.name".to_string()),
///         ("target.email".to_string(), "source.email".to_string()),
///     ]
/// );
/// assert_eq!(
///     build_update_mapping(&["single_col"]),
///     vec![("target.single_col".to_string(), "source.single_col".to_string())]
/// );
/// assert!(build_update_mapping(&[] as &[&str]).is_empty());
/// ```
pub fn build_update_mapping<S: AsRef<str>>(update_columns: &[S]) -> Vec<(String, String)> {
    update_columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            (
                format!("{TARGET_ALIAS}.{column}"),
                format!("{SOURCE_ALIAS}.{column}"),
            )
        })
        .collect()
}

/// The join predicate and aliases of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaMergeOptions {
    pub predicate: String,
    pub source_alias: String,
    pub target_alias: String,
}

/// ```
/// use fabric_utilities::write::merge::build_delta_merge_options;
///
/// let options = build_delta_merge_options("target.id = source.id");
/// assert_eq!(options.predicate, "target.id = source.id");
/// assert_eq!(options.source_alias, "source");
/// assert_eq!(options.target_alias, "target");
/// ```
pub fn build_delta_merge_options(merge_predicate: &str) -> DeltaMergeOptions {
    DeltaMergeOptions {
        predicate: merge_predicate.to_string(),
        source_alias: SOURCE_ALIAS.to_string(),
        target_alias: TARGET_ALIAS.to_string(),
    }
}

fn columns_except<S: AsRef<str>>(columns: &[S], excluded: &[&[S]]) -> Vec<String> {
    columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|column| {
            !excluded
                .iter()
                .any(|list| list.iter().any(|e| e.as_ref() == *column))
        })
        .map(String::from)
        .collect()
}

/// The merge plan of an upsert, derived from the data columns and the
/// column lists given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UpsertPlan {
    pub merge_options: DeltaMergeOptions,
    pub update_predicate: String,
    pub update_mapping: Vec<(String, String)>,
    pub insert_columns: Vec<String>,
}

impl UpsertPlan {
    pub fn try_new(
        columns: &[String],
        primary_key_columns: &[String],
        update_exclusion_columns: &[String],
        predicate_exclusion_columns: &[String],
    ) -> FabricResult<Self> {
        if primary_key_columns.is_empty() {
            return Err(FabricError::invalid(
                "at least one primary key column is required",
            ));
        }
        validate_columns_exist(columns, primary_key_columns, "Primary key")?;
        let exclusion_columns = update_exclusion_columns
            .iter()
            .chain(predicate_exclusion_columns)
            .cloned()
            .collect::<Vec<_>>();
        validate_columns_exist(columns, &exclusion_columns, "Exclusion")?;

        let merge_predicate = build_merge_predicate(primary_key_columns);
        let predicate_update_columns = get_predicate_update_columns(
            columns,
            primary_key_columns,
            predicate_exclusion_columns,
            update_exclusion_columns,
        );
        let update_columns =
            get_update_columns(columns, primary_key_columns, update_exclusion_columns);
        Ok(Self {
            merge_options: build_delta_merge_options(&merge_predicate),
            update_predicate: build_update_predicate(&predicate_update_columns),
            update_mapping: build_update_mapping(&update_columns),
            insert_columns: columns.to_vec(),
        })
    }
}
