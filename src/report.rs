use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::grades::{self, format_mean, GroupBy};
use crate::models::{GradeRecord, Student, SubjectCatalog};

const NO_GRADES: &str = "Nenhuma nota encontrada para este aluno.";

fn dash_if_empty(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => "-",
    }
}

pub fn build_report(
    student: &Student,
    subjects: &SubjectCatalog,
    records: &[GradeRecord],
    generated_at: NaiveDateTime,
) -> String {
    let by_subject = grades::aggregate(records, GroupBy::Subject);
    let by_label = grades::aggregate(records, GroupBy::SubjectAndLabel);

    let mut output = String::new();

    let _ = writeln!(output, "# Notas de {}", student.full_name());
    let _ = writeln!(
        output,
        "CPF {} | situação {} | gerado em {}",
        student.cpf,
        student.status,
        generated_at.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Notas");

    if records.is_empty() {
        let _ = writeln!(output, "{NO_GRADES}");
    } else {
        let _ = writeln!(output, "| Disciplina | Trimestre | Nota | Descrição |");
        let _ = writeln!(output, "|---|---|---|---|");
        for record in records {
            let term = record.term.as_ref().map(ToString::to_string);
            let score = record.score.as_ref().map(ToString::to_string);
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                subjects.name_for(record),
                dash_if_empty(term.as_deref()),
                dash_if_empty(score.as_deref()),
                dash_if_empty(record.label.as_deref()),
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Médias por Disciplina");

    if by_subject.is_empty() {
        let _ = writeln!(output, "{NO_GRADES}");
    } else {
        let _ = writeln!(output, "| Disciplina | Média | Status |");
        let _ = writeln!(output, "|---|---|---|");
        for result in by_subject.values() {
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                subjects.name(result.subject_id),
                format_mean(result.mean),
                result.status()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Médias por Descrição e Disciplina");

    if by_label.is_empty() {
        let _ = writeln!(output, "{NO_GRADES}");
    } else {
        let _ = writeln!(output, "| Descrição | Disciplina | Média |");
        let _ = writeln!(output, "|---|---|---|");
        for result in by_label.values() {
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                dash_if_empty(result.label.as_deref()),
                subjects.name(result.subject_id),
                format_mean(result.mean)
            );
        }
    }

    output
}
