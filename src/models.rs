//! Persisted rows, the API-facing views they map to, and the payloads that
//! create or patch them. Rows use English column names; the wire format keeps
//! the French field names clients already speak.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::err::Error;

pub const UNAVAILABLE_STUDENT: &str = "Etudiant indisponible";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OperatorRow {
    pub id: i64,
    pub name: String,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub disabled: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentRow {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub date_of_birth: NaiveDate,
    pub national_id: Option<String>,
    pub national_id_date: Option<NaiveDate>,
    pub contact: String,
    pub email: String,
    pub registration_number: String,
    pub address: String,
    pub track: String,
    pub level: String,
    pub academic_year: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QrCredentialRow {
    pub id: i64,
    pub student_id: i64,
    pub expiry_date: DateTime<Utc>,
    pub is_valid: bool,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalRow {
    pub id: i64,
    pub operation: String,
    pub operator_id: i64,
    pub student_registration_number: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorView {
    pub id: i64,
    pub nom: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCredentialView {
    pub id: i64,
    pub expire_date: DateTime<Utc>,
    pub is_valid: bool,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentView {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub dob: NaiveDate,
    pub cin: Option<String>,
    pub cin_date: Option<NaiveDate>,
    pub tel: String,
    pub email: String,
    pub matricule: String,
    pub adresse: String,
    pub parcours: String,
    pub niveau: String,
    pub annee_univ: String,
    pub qrcode: Vec<QrCredentialView>,
}

/// The student a journal entry points at, or a placeholder once that
/// student is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JournalStudent {
    Present(Box<StudentView>),
    Unavailable(String),
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalView {
    pub id: i64,
    pub operation: String,
    pub date: DateTime<Utc>,
    pub im_etudiant: Option<String>,
    pub effectue_par: Option<OperatorView>,
    pub etudiant: JournalStudent,
}

impl From<OperatorRow> for OperatorView {
    fn from(row: OperatorRow) -> Self {
        Self {
            id: row.id,
            nom: row.name,
            disabled: row.disabled,
        }
    }
}

impl From<QrCredentialRow> for QrCredentialView {
    fn from(row: QrCredentialRow) -> Self {
        Self {
            id: row.id,
            expire_date: row.expiry_date,
            is_valid: row.is_valid,
            data: row.token,
            created_at: row.created_at,
        }
    }
}

impl StudentView {
    pub fn from_row(row: StudentRow, qrcode: Vec<QrCredentialRow>) -> Self {
        Self {
            id: row.id,
            nom: row.name,
            prenom: row.surname,
            dob: row.date_of_birth,
            cin: row.national_id,
            cin_date: row.national_id_date,
            tel: row.contact,
            email: row.email,
            matricule: row.registration_number,
            adresse: row.address,
            parcours: row.track,
            niveau: row.level,
            annee_univ: row.academic_year,
            qrcode: qrcode.into_iter().map(QrCredentialView::from).collect(),
        }
    }
}

impl JournalView {
    pub fn from_row(
        row: JournalRow,
        operator: Option<OperatorRow>,
        student: Option<StudentView>,
    ) -> Self {
        Self {
            id: row.id,
            operation: row.operation,
            date: row.date,
            im_etudiant: row.student_registration_number,
            effectue_par: operator.map(OperatorView::from),
            etudiant: match student {
                Some(student) => JournalStudent::Present(Box::new(student)),
                None => JournalStudent::Unavailable(UNAVAILABLE_STUDENT.to_string()),
            },
        }
    }
}

impl StudentRow {
    /// Journal text for a deletion. It is the only record of the student's
    /// attributes once the row is gone.
    pub fn deletion_summary(&self) -> String {
        format!(
            "Suppression de {} {} IM: {} classe: {} {} année: {}",
            self.name,
            self.surname,
            self.registration_number,
            self.level,
            self.track,
            self.academic_year
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentCreate {
    pub nom: String,
    pub prenom: String,
    pub dob: NaiveDate,
    #[serde(default)]
    pub cin: Option<String>,
    #[serde(default)]
    pub cin_date: Option<NaiveDate>,
    pub tel: String,
    pub email: String,
    pub adresse: String,
    pub niveau: String,
    pub parcours: String,
    pub matricule: String,
    pub annee_univ: String,
}

impl StudentCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.matricule.trim().is_empty() {
            return Err(Error::validation("Le numéro matricule est obligatoire."));
        }
        validate_email(&self.email)
    }

    /// Row for a student not yet stored; `id` is whatever the caller knows.
    pub fn into_row(self, id: i64, created_at: DateTime<Utc>) -> StudentRow {
        StudentRow {
            id,
            name: self.nom,
            surname: self.prenom,
            date_of_birth: self.dob,
            national_id: self.cin,
            national_id_date: self.cin_date,
            contact: self.tel,
            email: self.email,
            registration_number: self.matricule,
            address: self.adresse,
            track: self.parcours,
            level: self.niveau,
            academic_year: self.annee_univ,
            created_at,
        }
    }
}

/// Partial update. Absent fields are left untouched; `cin` and `cin_date`
/// distinguish "absent" from an explicit `null`, which clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentPatch {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub dob: Option<NaiveDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub cin: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub cin_date: Option<Option<NaiveDate>>,
    pub tel: Option<String>,
    pub email: Option<String>,
    pub adresse: Option<String>,
    pub niveau: Option<String>,
    pub parcours: Option<String>,
    pub annee_univ: Option<String>,
    pub matricule: Option<String>,
}

impl StudentPatch {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(matricule) = &self.matricule {
            if matricule.trim().is_empty() {
                return Err(Error::validation("Le numéro matricule est obligatoire."));
            }
        }
        match &self.email {
            Some(email) => validate_email(email),
            None => Ok(()),
        }
    }

    pub fn apply(self, row: &mut StudentRow) {
        if let Some(v) = self.nom {
            row.name = v;
        }
        if let Some(v) = self.prenom {
            row.surname = v;
        }
        if let Some(v) = self.dob {
            row.date_of_birth = v;
        }
        if let Some(v) = self.cin {
            row.national_id = v;
        }
        if let Some(v) = self.cin_date {
            row.national_id_date = v;
        }
        if let Some(v) = self.tel {
            row.contact = v;
        }
        if let Some(v) = self.email {
            row.email = v;
        }
        if let Some(v) = self.adresse {
            row.address = v;
        }
        if let Some(v) = self.niveau {
            row.level = v;
        }
        if let Some(v) = self.parcours {
            row.track = v;
        }
        if let Some(v) = self.annee_univ {
            row.academic_year = v;
        }
        if let Some(v) = self.matricule {
            row.registration_number = v;
        }
    }
}

fn validate_email(email: &str) -> Result<(), Error> {
    email
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| Error::validation(format!("Adresse email invalide: {}", email)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorCreate {
    pub nom: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorPatch {
    pub nom: Option<String>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalCreate {
    pub operation: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub im_etudiant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> StudentRow {
        StudentRow {
            id: 1,
            name: "Jean".to_string(),
            surname: "Dupont".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2001, 4, 2).unwrap(),
            national_id: Some("101".to_string()),
            national_id_date: None,
            contact: "0340000000".to_string(),
            email: "jean@example.org".to_string(),
            registration_number: "E123".to_string(),
            address: "Lot II".to_string(),
            track: "IG".to_string(),
            level: "L3".to_string(),
            academic_year: "2023-2024".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let patch: StudentPatch = serde_json::from_str(r#"{"tel": "0341111111"}"#).unwrap();
        let mut student = row();
        patch.apply(&mut student);
        assert_eq!(student.contact, "0341111111");
        assert_eq!(student.national_id.as_deref(), Some("101"));
        assert_eq!(student.registration_number, "E123");
    }

    #[test]
    fn explicit_null_clears_nullable_fields_only() {
        let patch: StudentPatch =
            serde_json::from_str(r#"{"cin": null, "nom": null}"#).unwrap();
        assert_eq!(patch.cin, Some(None));
        let mut student = row();
        patch.apply(&mut student);
        assert_eq!(student.national_id, None);
        assert_eq!(student.name, "Jean");
    }

    #[test]
    fn deletion_summary_keeps_descriptive_fields() {
        let text = row().deletion_summary();
        assert!(text.contains("Jean Dupont"));
        assert!(text.contains("IM: E123"));
        assert!(text.contains("classe: L3 IG"));
        assert!(text.contains("année: 2023-2024"));
    }

    #[test]
    fn journal_view_without_student_uses_placeholder() {
        let entry = JournalRow {
            id: 3,
            operation: "x".to_string(),
            operator_id: 9,
            student_registration_number: Some("E123".to_string()),
            date: Utc::now(),
        };
        let view = JournalView::from_row(entry, None, None);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["etudiant"], UNAVAILABLE_STUDENT);
        assert!(json.get("effectue_par").is_none());
    }

    #[test]
    fn rejects_malformed_email() {
        let patch = StudentPatch {
            email: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(matches!(patch.validate(), Err(Error::Validation { .. })));
    }
}
