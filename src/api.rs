use anyhow::{bail, Context};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::cpf;
use crate::models::{GradeInput, GradeRecord, NewStudent, Student, Subject};

/// JSON client for the school records service.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(std::time::Duration::from_secs(10)))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: config.api_url.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("failed to parse response from {url}"))
    }

    async fn send_json<B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> anyhow::Result<()> {
        let url = self.url(path);
        debug!(%url, %method, "sending");
        let response = self
            .http
            .request(method, &url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        let url = self.url(path);
        debug!(%url, "DELETE");
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn list_students(&self) -> anyhow::Result<Vec<Student>> {
        let value: serde_json::Value = self.get_json("/alunos").await?;
        let (students, skipped) = parse_each(value, "Dados inválidos dos alunos")?;
        if skipped > 0 {
            warn!(skipped, "ignored malformed student rows");
        }
        Ok(students)
    }

    pub async fn get_student(&self, id: i64) -> anyhow::Result<Student> {
        self.get_json(&format!("/alunos/{id}"))
            .await
            .with_context(|| format!("Aluno {id} não encontrado"))
    }

    pub async fn create_student(&self, student: &NewStudent) -> anyhow::Result<()> {
        if !cpf::is_valid(&student.cpf) {
            bail!("CPF inválido");
        }
        self.send_json(reqwest::Method::POST, "/alunos", student)
            .await
            .context("Erro ao cadastrar aluno")
    }

    pub async fn update_student(&self, student: &Student) -> anyhow::Result<()> {
        if !cpf::is_valid(&student.cpf) {
            bail!("CPF inválido");
        }
        self.send_json(reqwest::Method::PUT, &format!("/alunos/{}", student.id), student)
            .await
            .context("Erro ao atualizar os dados")
    }

    pub async fn delete_student(&self, id: i64) -> anyhow::Result<()> {
        self.delete(&format!("/alunos/{id}"))
            .await
            .context("Erro ao deletar aluno")
    }

    pub async fn list_subjects(&self) -> anyhow::Result<Vec<Subject>> {
        self.get_json("/disciplinas").await
    }

    pub async fn list_grades(
        &self,
        student_id: i64,
        subject_id: Option<i64>,
    ) -> anyhow::Result<Vec<GradeRecord>> {
        let value: serde_json::Value = self.get_json(&grades_path(student_id, subject_id)).await?;
        parse_grades(value)
    }

    pub async fn create_grade(&self, grade: GradeInput) -> anyhow::Result<()> {
        let grade = grade.validate()?;
        self.send_json(reqwest::Method::POST, "/notas", &grade)
            .await
            .context("Erro ao cadastrar nota")
    }

    pub async fn update_grade(&self, id: i64, grade: GradeInput) -> anyhow::Result<()> {
        let grade = grade.validate()?;
        self.send_json(reqwest::Method::PUT, &format!("/notas/{id}"), &grade)
            .await
            .context("Erro ao atualizar nota")
    }

    pub async fn delete_grade(&self, id: i64) -> anyhow::Result<()> {
        self.delete(&format!("/notas/{id}"))
            .await
            .context("Erro ao deletar nota")
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn grades_path(student_id: i64, subject_id: Option<i64>) -> String {
    match subject_id {
        Some(subject_id) => format!("/notas/aluno/{student_id}?disciplina_id={subject_id}"),
        None => format!("/notas/aluno/{student_id}"),
    }
}

/// Converts each array element on its own; elements that do not fit `T` are
/// counted and left out.
fn parse_each<T: DeserializeOwned>(
    value: serde_json::Value,
    not_an_array: &str,
) -> anyhow::Result<(Vec<T>, usize)> {
    let serde_json::Value::Array(items) = value else {
        bail!("{not_an_array}");
    };

    let mut parsed = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        match serde_json::from_value(item) {
            Ok(record) => parsed.push(record),
            Err(err) => {
                debug!(error = %err, "skipping row");
                skipped += 1;
            }
        }
    }

    Ok((parsed, skipped))
}

fn parse_grades(value: serde_json::Value) -> anyhow::Result<Vec<GradeRecord>> {
    let (records, skipped) = parse_each(value, "Dados inválidos das notas")?;
    if skipped > 0 {
        warn!(skipped, "ignored malformed grade records");
    }
    Ok(records)
}

async fn ensure_success(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!(error_message(status, &body))
}

/// The service reports failures as `{"error": "..."}`; fall back to the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        format!("service returned status {status}")
    } else {
        format!("service returned status {status}: {detail}")
    }
}
