use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Statuses other than ATIVO/INATIVO are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StudentStatus {
    #[default]
    Ativo,
    Inativo,
    Other(String),
}

impl StudentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StudentStatus::Ativo => "ATIVO",
            StudentStatus::Inativo => "INATIVO",
            StudentStatus::Other(status) => status.as_str(),
        }
    }
}

impl From<&str> for StudentStatus {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "ATIVO" => StudentStatus::Ativo,
            "INATIVO" => StudentStatus::Inativo,
            other => StudentStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StudentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StudentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(StudentStatus::from).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    #[serde(rename = "nome")]
    pub first_name: String,
    #[serde(rename = "sobrenome")]
    pub last_name: String,
    #[serde(rename = "dataNascimento", default, deserialize_with = "birth_date")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub status: StudentStatus,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewStudent {
    #[serde(rename = "nome")]
    pub first_name: String,
    #[serde(rename = "sobrenome")]
    pub last_name: String,
    #[serde(rename = "dataNascimento")]
    pub birth_date: NaiveDate,
    pub cpf: String,
    pub status: StudentStatus,
}

/// The service stores birth dates as timestamps; only the calendar date is kept.
/// Null or unreadable dates become `None` so one bad row does not hide the rest.
fn birth_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| {
            let date_part = raw.get(..10).unwrap_or(raw);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
        }))
}

pub fn status_summary(students: &[Student]) -> BTreeMap<StudentStatus, usize> {
    let mut summary = BTreeMap::new();
    for student in students {
        *summary.entry(student.status.clone()).or_insert(0) += 1;
    }
    summary
}

/// `N alunos (x.x%)`; an empty total reads as 0.0%.
pub fn format_share(count: usize, total: usize) -> String {
    let percent = if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    };
    format!("{count} alunos ({percent:.1}%)")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
}

const DEFAULT_SUBJECTS: [(i64, &str); 18] = [
    (1, "Literatura Inglesa"),
    (2, "Álgebra II"),
    (3, "Geometria"),
    (4, "Pré-Cálculo"),
    (5, "Cálculo"),
    (6, "Biologia"),
    (7, "Química"),
    (8, "Física"),
    (9, "História dos EUA"),
    (10, "História Mundial"),
    (11, "Governo"),
    (12, "Economia"),
    (13, "Espanhol"),
    (14, "Francês"),
    (15, "Artes"),
    (16, "Música"),
    (17, "Educação Física"),
    (18, "Ciência da Computação"),
];

pub const UNKNOWN_SUBJECT: &str = "Desconhecida";

/// Resolves subject ids to display names.
#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    names: HashMap<i64, String>,
}

impl SubjectCatalog {
    pub fn builtin() -> Self {
        Self {
            names: DEFAULT_SUBJECTS
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        }
    }

    /// Service subjects take precedence over the built-in names.
    pub fn with_subjects(subjects: &[Subject]) -> Self {
        let mut catalog = Self::builtin();
        for subject in subjects {
            catalog.names.insert(subject.id, subject.name.clone());
        }
        catalog
    }

    pub fn name(&self, id: i64) -> &str {
        self.names
            .get(&id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SUBJECT)
    }

    /// Prefers the name embedded in the record over the catalog entry.
    pub fn name_for(&self, record: &GradeRecord) -> String {
        match record.subject_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.name(record.subject_id).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Index(i64),
    Label(String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Index(index) => write!(f, "{index}"),
            Term::Label(label) => f.write_str(label),
        }
    }
}

/// A score as it arrived on the wire, before any numeric check.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    Number(f64),
    Text(String),
}

impl RawScore {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawScore::Number(value) => Some(*value),
            RawScore::Text(text) => text.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for RawScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawScore::Number(value) => write!(f, "{value}"),
            RawScore::Text(text) => f.write_str(text),
        }
    }
}

impl Serialize for RawScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawScore::Number(value) => serializer.serialize_f64(*value),
            RawScore::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for RawScore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawScoreVisitor;

        impl<'de> serde::de::Visitor<'de> for RawScoreVisitor {
            type Value = RawScore;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("any score value")
            }

            fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<RawScore, E> {
                Ok(RawScore::Number(value))
            }

            fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<RawScore, E> {
                Ok(RawScore::Number(value as f64))
            }

            fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<RawScore, E> {
                Ok(RawScore::Number(value as f64))
            }

            fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<RawScore, E> {
                Ok(RawScore::Text(value.to_string()))
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<RawScore, E> {
                Ok(RawScore::Text(value.to_string()))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<RawScore, E> {
                Ok(RawScore::Text(String::new()))
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<RawScore, E> {
                Ok(RawScore::Text(String::new()))
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RawScore, D::Error> {
                deserializer.deserialize_any(self)
            }

            // objects and arrays are not scores; the engine drops them
            fn visit_seq<A: serde::de::SeqAccess<'de>>(self, mut seq: A) -> Result<RawScore, A::Error> {
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(RawScore::Text(String::new()))
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(self, mut map: A) -> Result<RawScore, A::Error> {
                while map
                    .next_entry::<serde::de::IgnoredAny, serde::de::IgnoredAny>()?
                    .is_some()
                {}
                Ok(RawScore::Text(String::new()))
            }
        }

        deserializer.deserialize_any(RawScoreVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "aluno_id", default)]
    pub student_id: i64,
    #[serde(rename = "disciplina_id")]
    pub subject_id: i64,
    #[serde(rename = "disciplina", default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(rename = "trimestre", default)]
    pub term: Option<Term>,
    #[serde(rename = "nota", default)]
    pub score: Option<RawScore>,
    #[serde(rename = "descricao", default)]
    pub label: Option<String>,
}

impl GradeRecord {
    /// Trimmed label, `None` when absent or blank.
    pub fn label_key(&self) -> Option<String> {
        self.label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeInput {
    #[serde(rename = "aluno_id")]
    pub student_id: i64,
    #[serde(rename = "disciplina_id")]
    pub subject_id: i64,
    #[serde(rename = "trimestre")]
    pub term: Term,
    #[serde(rename = "nota")]
    pub score: f64,
    #[serde(rename = "descricao")]
    pub label: String,
}

impl GradeInput {
    /// Applies the same checks the registration form enforces before posting.
    pub fn validate(self) -> anyhow::Result<Self> {
        if !self.score.is_finite() || !(0.0..=10.0).contains(&self.score) {
            bail!("Nota deve ser um número entre 0 e 10");
        }
        if self.subject_id <= 0 {
            bail!("Disciplina é obrigatória");
        }
        let term = match self.term {
            Term::Label(label) => {
                let label = label.trim();
                if label.is_empty() {
                    bail!("Trimestre é obrigatório");
                }
                match label.parse::<i64>() {
                    Ok(index) => Term::Index(index),
                    Err(_) => Term::Label(label.to_string()),
                }
            }
            index => index,
        };

        Ok(Self {
            term,
            label: self.label.trim().to_string(),
            ..self
        })
    }
}
