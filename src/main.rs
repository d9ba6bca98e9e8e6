use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod api;
mod config;
mod cpf;
mod grades;
mod import;
mod models;
mod report;

use api::ApiClient;
use config::Config;
use grades::GroupBy;
use models::{GradeInput, GradeRecord, NewStudent, StudentStatus, SubjectCatalog, Term};

#[derive(Parser)]
#[command(name = "boletim")]
#[command(about = "Student grade records and averages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Ativo,
    Inativo,
}

impl From<StatusArg> for StudentStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Ativo => StudentStatus::Ativo,
            StatusArg::Inativo => StudentStatus::Inativo,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List registered students
    Students,
    /// Show one student
    Student {
        #[arg(long)]
        id: i64,
    },
    /// Register a student
    AddStudent {
        #[arg(long)]
        nome: String,
        #[arg(long)]
        sobrenome: String,
        /// Birth date as YYYY-MM-DD
        #[arg(long)]
        nascimento: NaiveDate,
        #[arg(long)]
        cpf: String,
    },
    /// Update a student; omitted fields keep their current value
    EditStudent {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        nome: Option<String>,
        #[arg(long)]
        sobrenome: Option<String>,
        #[arg(long)]
        nascimento: Option<NaiveDate>,
        #[arg(long)]
        cpf: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Delete a student
    DeleteStudent {
        #[arg(long)]
        id: i64,
    },
    /// List subjects
    Subjects,
    /// List a student's grades
    Grades {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: Option<i64>,
    },
    /// Register a grade
    AddGrade {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: i64,
        #[arg(long)]
        term: String,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value = "")]
        label: String,
    },
    /// Replace a grade
    EditGrade {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: i64,
        #[arg(long)]
        term: String,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value = "")]
        label: String,
    },
    /// Delete a grade
    DeleteGrade {
        #[arg(long)]
        id: i64,
    },
    /// Average grades per subject, or per subject and label
    #[command(group(
        ArgGroup::new("source")
            .args(["student", "csv"])
            .required(true)
            .multiple(true)
    ))]
    Averages {
        #[arg(long)]
        student: Option<i64>,
        /// Read grades from a CSV file instead of the service
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        subject: Option<i64>,
        #[arg(long, default_value_t = false)]
        by_label: bool,
        /// Write the averages as CSV
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report card
    Report {
        #[arg(long)]
        student: i64,
        #[arg(long, default_value = "boletim.md")]
        out: PathBuf,
    },
    /// Post grades from a CSV file to the service
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Validate a CPF number
    CheckCpf { cpf: String },
}

fn init_logging(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let (json_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("boletim.log"));
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

async fn load_subjects(client: &ApiClient) -> SubjectCatalog {
    match client.list_subjects().await {
        Ok(subjects) => SubjectCatalog::with_subjects(&subjects),
        Err(err) => {
            warn!(error = %err, "could not load subjects, using built-in names");
            SubjectCatalog::builtin()
        }
    }
}

fn warn_invalid_scores(records: &[GradeRecord]) {
    let skipped = grades::invalid_scores(records);
    if skipped > 0 {
        warn!(skipped, "ignored grades without a score between 0 and 10");
    }
}

fn grade_input(student: i64, subject: i64, term: String, score: f64, label: String) -> GradeInput {
    GradeInput {
        student_id: student,
        subject_id: subject,
        term: Term::Label(term),
        score,
        label,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _log_guard = init_logging(config.log_file.as_deref());
    let client = ApiClient::new(&config)?;

    match cli.command {
        Commands::Students => {
            let students = client.list_students().await?;
            if students.is_empty() {
                println!("Nenhum aluno cadastrado.");
                return Ok(());
            }
            for student in &students {
                println!(
                    "{:>4}  {}  CPF {}  nascido em {}  {}",
                    student.id,
                    student.full_name(),
                    student.cpf,
                    student
                        .birth_date
                        .map(|date| date.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    student.status
                );
            }

            println!();
            println!("Distribuição dos Alunos por Status");
            for (status, count) in models::status_summary(&students) {
                println!("- {status}: {}", models::format_share(count, students.len()));
            }
        }
        Commands::Student { id } => {
            let student = client.get_student(id).await?;
            println!("{}", serde_json::to_string_pretty(&student)?);
        }
        Commands::AddStudent {
            nome,
            sobrenome,
            nascimento,
            cpf,
        } => {
            let student = NewStudent {
                first_name: nome.trim().to_string(),
                last_name: sobrenome.trim().to_string(),
                birth_date: nascimento,
                cpf: cpf::digits(&cpf),
                status: StudentStatus::Ativo,
            };
            client.create_student(&student).await?;
            info!(cpf = %student.cpf, "student registered");
            println!("Aluno cadastrado com sucesso!");
        }
        Commands::EditStudent {
            id,
            nome,
            sobrenome,
            nascimento,
            cpf,
            status,
        } => {
            let mut student = client.get_student(id).await?;
            if let Some(nome) = nome {
                student.first_name = nome.trim().to_string();
            }
            if let Some(sobrenome) = sobrenome {
                student.last_name = sobrenome.trim().to_string();
            }
            if let Some(nascimento) = nascimento {
                student.birth_date = Some(nascimento);
            }
            if let Some(cpf) = cpf {
                student.cpf = cpf::digits(&cpf);
            }
            if let Some(status) = status {
                student.status = status.into();
            }
            client.update_student(&student).await?;
            info!(id, "student updated");
            println!("Dados atualizados com sucesso!");
        }
        Commands::DeleteStudent { id } => {
            client.delete_student(id).await?;
            info!(id, "student deleted");
            println!("Aluno {id} removido.");
        }
        Commands::Subjects => {
            for subject in client.list_subjects().await? {
                println!("{:>4}  {}", subject.id, subject.name);
            }
        }
        Commands::Grades { student, subject } => {
            let subjects = load_subjects(&client).await;
            let records = client.list_grades(student, subject).await?;
            if records.is_empty() {
                println!("Nenhuma nota encontrada para este aluno.");
                return Ok(());
            }
            for record in &records {
                println!(
                    "{:>4}  {}  trimestre {}  nota {}  {}",
                    record.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                    subjects.name_for(record),
                    record.term.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string()),
                    record.score.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string()),
                    record.label_key().unwrap_or_else(|| "-".to_string())
                );
            }
        }
        Commands::AddGrade {
            student,
            subject,
            term,
            score,
            label,
        } => {
            client
                .create_grade(grade_input(student, subject, term, score, label))
                .await?;
            info!(student, subject, score, "grade registered");
            println!("Nota cadastrada com sucesso!");
        }
        Commands::EditGrade {
            id,
            student,
            subject,
            term,
            score,
            label,
        } => {
            client
                .update_grade(id, grade_input(student, subject, term, score, label))
                .await?;
            info!(id, "grade updated");
            println!("Nota atualizada com sucesso!");
        }
        Commands::DeleteGrade { id } => {
            client.delete_grade(id).await?;
            info!(id, "grade deleted");
            println!("Nota {id} removida.");
        }
        Commands::Averages {
            student,
            csv,
            subject,
            by_label,
            out,
        } => {
            let (records, subjects) = match csv {
                Some(path) => {
                    let records: Vec<GradeRecord> = import::read_grades_file(&path)?
                        .into_iter()
                        .filter(|r| student.map_or(true, |id| r.student_id == id))
                        .filter(|r| subject.map_or(true, |id| r.subject_id == id))
                        .collect();
                    (records, SubjectCatalog::builtin())
                }
                None => {
                    let Some(student) = student else {
                        bail!("--student or --csv is required");
                    };
                    let subjects = load_subjects(&client).await;
                    (client.list_grades(student, subject).await?, subjects)
                }
            };
            warn_invalid_scores(&records);

            let group_by = if by_label {
                GroupBy::SubjectAndLabel
            } else {
                GroupBy::Subject
            };
            let results = grades::aggregate(&records, group_by);

            if results.is_empty() {
                println!("Nenhuma nota encontrada para este aluno.");
                return Ok(());
            }

            for result in results.values() {
                let label = result
                    .label
                    .as_deref()
                    .map(|label| format!(" [{label}]"))
                    .unwrap_or_default();
                println!(
                    "- {}{}: média {} ({}) em {} notas",
                    subjects.name(result.subject_id),
                    label,
                    grades::format_mean(result.mean),
                    result.status(),
                    result.sample_count
                );
            }

            if let Some(out) = out {
                let file = std::fs::File::create(&out)
                    .with_context(|| format!("failed to create {}", out.display()))?;
                import::write_averages(file, results.values(), &subjects)?;
                println!("Médias gravadas em {}.", out.display());
            }
        }
        Commands::Report { student, out } => {
            let subjects = load_subjects(&client).await;
            let profile = client.get_student(student).await?;
            let records = client.list_grades(student, None).await?;
            warn_invalid_scores(&records);
            let report = report::build_report(
                &profile,
                &subjects,
                &records,
                chrono::Local::now().naive_local(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Boletim gravado em {}.", out.display());
        }
        Commands::Import { csv } => {
            let rows = import::read_grade_lines_file(&csv)?;
            let mut inserted = 0usize;

            for (line, row) in rows {
                let Some(score) = grades::valid_score(&row) else {
                    warn!(line, "skipping row without a score between 0 and 10");
                    continue;
                };
                let Some(term) = row.term else {
                    warn!(line, "skipping row without a term");
                    continue;
                };
                let input = GradeInput {
                    student_id: row.student_id,
                    subject_id: row.subject_id,
                    term,
                    score,
                    label: row.label.unwrap_or_default(),
                };
                match client.create_grade(input).await {
                    Ok(()) => inserted += 1,
                    Err(err) => warn!(line, error = %format!("{err:#}"), "row rejected"),
                }
            }

            println!("{inserted} notas importadas de {}.", csv.display());
        }
        Commands::CheckCpf { cpf } => match cpf::format(&cpf) {
            Some(formatted) => println!("CPF válido: {formatted}"),
            None => bail!("CPF inválido"),
        },
    }

    Ok(())
}
