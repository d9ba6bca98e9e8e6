use std::io::{Read, Write};

use anyhow::Context;
use serde::Serialize;
use tracing::warn;

use crate::grades::{format_mean, AggregateResult};
use crate::models::{GradeRecord, SubjectCatalog};

/// Reads `aluno_id,disciplina_id,trimestre,nota,descricao` rows, paired with
/// their line number. Rows that do not fit a grade record are logged and skipped.
pub fn read_grade_lines<R: Read>(reader: R) -> anyhow::Result<Vec<(u64, GradeRecord)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers().context("failed to read CSV header")?.clone();
    let mut rows = Vec::new();

    for result in reader.records() {
        let row = result.context("failed to read CSV")?;
        let line = row.position().map_or(0, |position| position.line());
        match row.deserialize::<GradeRecord>(Some(&headers)) {
            Ok(record) => rows.push((line, record)),
            Err(err) => warn!(line, error = %err, "skipping malformed grade row"),
        }
    }

    Ok(rows)
}

pub fn read_grades<R: Read>(reader: R) -> anyhow::Result<Vec<GradeRecord>> {
    Ok(read_grade_lines(reader)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

pub fn read_grade_lines_file(path: &std::path::Path) -> anyhow::Result<Vec<(u64, GradeRecord)>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_grade_lines(file)
}

pub fn read_grades_file(path: &std::path::Path) -> anyhow::Result<Vec<GradeRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_grades(file)
}

#[derive(Serialize)]
struct AverageRow<'a> {
    disciplina_id: i64,
    disciplina: &'a str,
    descricao: &'a str,
    media: String,
    notas: usize,
    status: &'static str,
}

pub fn write_averages<'a, W, I>(writer: W, results: I, subjects: &SubjectCatalog) -> anyhow::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a AggregateResult>,
{
    let mut writer = csv::Writer::from_writer(writer);

    for result in results {
        writer.serialize(AverageRow {
            disciplina_id: result.subject_id,
            disciplina: subjects.name(result.subject_id),
            descricao: result.label.as_deref().unwrap_or(""),
            media: format_mean(result.mean),
            notas: result.sample_count,
            status: result.status().as_str(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
