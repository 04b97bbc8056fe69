//! Fixtures shared by the unit and router tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use chrono::{Duration, NaiveDate};
use jsonwebtoken::Algorithm;
use sqlx::SqlitePool;

use crate::auth::ActiveOperator;
use crate::config::Config;
use crate::mail::QrMailer;
use crate::models::{OperatorRow, StudentCreate};
use crate::password::PasswordHasherService;
use crate::token::TokenService;
use crate::{db, operators, App};

pub fn config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        bind_addr: ([127, 0, 0, 1], 0).into(),
        secret_key: "test-secret".to_string(),
        algorithm: Algorithm::HS256,
        access_token_ttl: Duration::minutes(15),
        refresh_token_ttl: Duration::days(7),
        password_rounds: 1_000,
        smtp: None,
    }
}

/// Remembers every recipient instead of talking SMTP.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl QrMailer for RecordingMailer {
    fn send_qr(&self, to: &str, png: &[u8]) -> anyhow::Result<()> {
        if self.fail.swap(false, Ordering::SeqCst) {
            anyhow::bail!("relay unreachable");
        }
        assert!(png.starts_with(b"\x89PNG"));
        self.sent.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

static LOGS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static INSTALL_LOGGER: Once = Once::new();

struct CapturingLogger;

impl log::Log for CapturingLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            LOGS.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Keeps every info-or-above record in memory for the rest of the test
/// binary. Tests share the buffer, so look for something only yours logs.
pub fn capture_logs() {
    INSTALL_LOGGER.call_once(|| {
        if log::set_logger(&CapturingLogger).is_ok() {
            log::set_max_level(log::LevelFilter::Info);
        }
    });
}

pub fn logged(needle: &str) -> bool {
    LOGS.lock().unwrap().iter().any(|line| line.contains(needle))
}

pub async fn app() -> (Arc<App>, Arc<RecordingMailer>) {
    let config = config();
    let mailer = Arc::new(RecordingMailer::default());
    let app = App {
        db: db::memory().await,
        tokens: TokenService::new(&config),
        passwords: PasswordHasherService::new(config.password_rounds),
        mailer: mailer.clone(),
        config,
    };
    (Arc::new(app), mailer)
}

pub async fn register(app: &App, name: &str, password: &str) -> OperatorRow {
    let hash = app.passwords.hash(password).unwrap();
    operators::insert(&app.db, name, &hash).await.unwrap()
}

pub async fn active_operator(db: &SqlitePool, name: &str) -> ActiveOperator {
    let row = operators::insert(db, name, "unused").await.unwrap();
    ActiveOperator::activate(row).unwrap()
}

/// "Jean Dupont", with an email derived from the registration number.
pub fn student(matricule: &str, cin: Option<&str>) -> StudentCreate {
    StudentCreate {
        nom: "Jean".to_string(),
        prenom: "Dupont".to_string(),
        dob: NaiveDate::from_ymd_opt(2002, 5, 17).unwrap(),
        cin: cin.map(str::to_string),
        cin_date: None,
        tel: "0340000000".to_string(),
        email: format!("{}@example.org", matricule.to_lowercase()),
        adresse: "Lot II A".to_string(),
        niveau: "L3".to_string(),
        parcours: "IG".to_string(),
        matricule: matricule.to_string(),
        annee_univ: "2023-2024".to_string(),
    }
}
