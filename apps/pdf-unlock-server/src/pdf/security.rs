//! PDF encryption and decryption
//!
//! Defines the security trait and a `qpdf` backed implementation. Input and
//! output go through scratch files in the store's staging directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::has_pdf_header;

/// Passwords tried, in order, when unlocking without user input
pub const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "admin", "user", "1234", "12345", "123456789", "qwerty", "abc123",
    "password123", "admin123", "user123", "test", "test123", "demo", "demo123", "guest",
    "guest123", "public", "public123", "default", "default123", "123", "0000", "1111", "2222",
    "3333", "4444", "5555", "6666", "7777", "8888", "9999", "000000", "111111", "secret",
    "private", "secure", "access", "login",
];

/// qpdf exit code for "succeeded with warnings"
const EXIT_WARNINGS: i32 = 3;
const EXIT_ERROR: i32 = 2;

/// Key length used when encrypting
const ENCRYPTION_BITS: &str = "256";

#[derive(Debug, thiserror::Error)]
pub enum PdfSecurityError {
    #[error("Invalid PDF: {0}")]
    InvalidInput(String),

    #[error("File of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("The PDF is protected with a password that could not be determined automatically")]
    PasswordRequired,

    #[error("Incorrect password")]
    InvalidPassword,

    #[error("PDF tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("PDF tool failed (exit code {code:?}): {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check size limits and the PDF header before handing bytes to a tool
pub fn validate_pdf_bytes(bytes: &[u8], max_bytes: usize) -> Result<(), PdfSecurityError> {
    if bytes.is_empty() {
        return Err(PdfSecurityError::InvalidInput("file is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(PdfSecurityError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    if !has_pdf_header(bytes) {
        return Err(PdfSecurityError::InvalidInput(
            "missing %PDF- header".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Security trait
// ============================================================================

#[async_trait]
pub trait PdfSecurity: Send + Sync {
    /// Remove encryption
    ///
    /// `None` tries the empty password. Unencrypted input is returned
    /// rewritten but otherwise unchanged.
    async fn unlock(&self, pdf: &[u8], password: Option<&str>) -> Result<Vec<u8>, PdfSecurityError>;

    /// Encrypt with a user password; the owner password defaults to it
    async fn lock(
        &self,
        pdf: &[u8],
        user_password: &str,
        owner_password: Option<&str>,
    ) -> Result<Vec<u8>, PdfSecurityError>;
}

/// Unlock without user input: the empty password first, then a list of
/// common passwords
pub async fn unlock_automatically(
    security: &dyn PdfSecurity,
    pdf: &[u8],
) -> Result<Vec<u8>, PdfSecurityError> {
    match security.unlock(pdf, None).await {
        Err(PdfSecurityError::PasswordRequired) | Err(PdfSecurityError::InvalidPassword) => {}
        other => return other,
    }

    for candidate in COMMON_PASSWORDS {
        match security.unlock(pdf, Some(candidate)).await {
            Ok(unlocked) => {
                tracing::info!("PDF unlocked with a common password");
                return Ok(unlocked);
            }
            Err(PdfSecurityError::InvalidPassword) => continue,
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(candidates = COMMON_PASSWORDS.len(), "Automatic unlock exhausted");
    Err(PdfSecurityError::PasswordRequired)
}

// ============================================================================
// qpdf implementation
// ============================================================================

pub struct QpdfSecurity {
    binary: String,
    scratch_dir: PathBuf,
}

impl QpdfSecurity {
    pub fn new(binary: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Check that the binary can be executed
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn scratch_path(&self, label: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("qpdf_{}_{}", Uuid::new_v4().simple(), label))
    }

    /// Run qpdf with `args`, feeding `pdf` as the input file
    ///
    /// `args` receives the input and output paths. Scratch files are removed
    /// whether or not the tool succeeds.
    pub(super) async fn run<F>(
        &self,
        pdf: &[u8],
        password_given: bool,
        scratch: &[&Path],
        args: F,
    ) -> Result<Vec<u8>, PdfSecurityError>
    where
        F: FnOnce(&Path, &Path) -> Vec<std::ffi::OsString>,
    {
        let input_path = self.scratch_path("in.pdf");
        let output_path = self.scratch_path("out.pdf");

        let result = async {
            tokio::fs::write(&input_path, pdf).await?;

            let output = Command::new(&self.binary)
                .args(args(&input_path, &output_path))
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| {
                    PdfSecurityError::ToolUnavailable(format!("failed to run {}: {}", self.binary, e))
                })?;

            let stderr = String::from_utf8_lossy(&output.stderr);
            classify_exit(output.status.code(), &stderr, password_given)?;

            Ok::<_, PdfSecurityError>(tokio::fs::read(&output_path).await?)
        }
        .await;

        for path in [input_path.as_path(), output_path.as_path()]
            .into_iter()
            .chain(scratch.iter().copied())
        {
            let _ = tokio::fs::remove_file(path).await;
        }

        result
    }
}

#[async_trait]
impl PdfSecurity for QpdfSecurity {
    async fn unlock(&self, pdf: &[u8], password: Option<&str>) -> Result<Vec<u8>, PdfSecurityError> {
        // The password goes through a file so it never shows up in the process list
        let password_path = self.scratch_path("password");
        tokio::fs::write(&password_path, password.unwrap_or("")).await?;

        let password_arg = {
            let mut arg = std::ffi::OsString::from("--password-file=");
            arg.push(&password_path);
            arg
        };

        let unlocked = self
            .run(pdf, password.is_some(), &[password_path.as_path()], |input, output| {
                vec![
                    password_arg,
                    "--decrypt".into(),
                    input.as_os_str().to_owned(),
                    output.as_os_str().to_owned(),
                ]
            })
            .await?;

        tracing::debug!(input_bytes = pdf.len(), output_bytes = unlocked.len(), "qpdf decrypt finished");
        Ok(unlocked)
    }

    async fn lock(
        &self,
        pdf: &[u8],
        user_password: &str,
        owner_password: Option<&str>,
    ) -> Result<Vec<u8>, PdfSecurityError> {
        let owner_password = owner_password.unwrap_or(user_password);

        // Passwords go through an argument file, as with unlock
        let arg_path = self.scratch_path("encrypt.args");
        tokio::fs::write(&arg_path, encrypt_arg_file(user_password, owner_password)?).await?;

        let arg_file = {
            let mut arg = std::ffi::OsString::from("@");
            arg.push(&arg_path);
            arg
        };

        let locked = self
            .run(pdf, true, &[arg_path.as_path()], |input, output| {
                vec![
                    arg_file,
                    input.as_os_str().to_owned(),
                    output.as_os_str().to_owned(),
                ]
            })
            .await?;

        tracing::debug!(input_bytes = pdf.len(), output_bytes = locked.len(), "qpdf encrypt finished");
        Ok(locked)
    }
}

/// Contents of the qpdf `@file` holding the encryption options
///
/// qpdf reads one argument per line, so passwords may not contain line breaks.
fn encrypt_arg_file(user_password: &str, owner_password: &str) -> Result<String, PdfSecurityError> {
    if [user_password, owner_password]
        .iter()
        .any(|p| p.contains(['\n', '\r']))
    {
        return Err(PdfSecurityError::InvalidInput(
            "passwords must not contain line breaks".to_string(),
        ));
    }
    Ok(format!(
        "--encrypt\n{}\n{}\n{}\n--\n",
        user_password, owner_password, ENCRYPTION_BITS
    ))
}

/// Map a qpdf exit status to a result
///
/// 0 is success and 3 is success with warnings. A password failure is
/// reported as exit 2 with "invalid password" on stderr.
pub fn classify_exit(
    code: Option<i32>,
    stderr: &str,
    password_given: bool,
) -> Result<(), PdfSecurityError> {
    match code {
        Some(0) | Some(EXIT_WARNINGS) => Ok(()),
        Some(EXIT_ERROR) if stderr.to_ascii_lowercase().contains("invalid password") => {
            if password_given {
                Err(PdfSecurityError::InvalidPassword)
            } else {
                Err(PdfSecurityError::PasswordRequired)
            }
        }
        code => Err(PdfSecurityError::ToolFailed {
            code,
            stderr: stderr.trim().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_classify_exit() {
        assert!(classify_exit(Some(0), "", false).is_ok());
        assert!(classify_exit(Some(3), "WARNING: recovered", true).is_ok());

        let stderr = "qpdf: in.pdf: invalid password";
        assert!(matches!(
            classify_exit(Some(2), stderr, false),
            Err(PdfSecurityError::PasswordRequired)
        ));
        assert!(matches!(
            classify_exit(Some(2), stderr, true),
            Err(PdfSecurityError::InvalidPassword)
        ));

        match classify_exit(Some(2), "  not a PDF file \n", true) {
            Err(PdfSecurityError::ToolFailed { code, stderr }) => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "not a PDF file");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(matches!(
            classify_exit(None, "", false),
            Err(PdfSecurityError::ToolFailed { code: None, .. })
        ));
    }

    #[test]
    fn test_encrypt_arg_file() {
        assert_eq!(
            encrypt_arg_file("user pw", "owner").unwrap(),
            "--encrypt\nuser pw\nowner\n256\n--\n"
        );
        assert!(matches!(
            encrypt_arg_file("two\nlines", "owner"),
            Err(PdfSecurityError::InvalidInput(_))
        ));
        assert!(matches!(
            encrypt_arg_file("user", "carriage\r"),
            Err(PdfSecurityError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_pdf_bytes() {
        assert!(validate_pdf_bytes(b"%PDF-1.4\n...", 1024).is_ok());
        assert!(matches!(
            validate_pdf_bytes(b"", 1024),
            Err(PdfSecurityError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_pdf_bytes(b"PK\x03\x04 zip", 1024),
            Err(PdfSecurityError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_pdf_bytes(&[b'%'; 64], 16),
            Err(PdfSecurityError::TooLarge { size: 64, limit: 16 })
        ));
    }

    /// Accepts exactly one password; records how many attempts were made
    struct FakeSecurity {
        password: Option<&'static str>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl PdfSecurity for FakeSecurity {
        async fn unlock(&self, pdf: &[u8], password: Option<&str>) -> Result<Vec<u8>, PdfSecurityError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match (self.password, password) {
                (None, _) => Ok(pdf.to_vec()),
                (Some(expected), Some(given)) if expected == given => Ok(b"unlocked".to_vec()),
                (Some(_), None) => Err(PdfSecurityError::PasswordRequired),
                (Some(_), Some(_)) => Err(PdfSecurityError::InvalidPassword),
            }
        }

        async fn lock(&self, pdf: &[u8], _: &str, _: Option<&str>) -> Result<Vec<u8>, PdfSecurityError> {
            Ok(pdf.to_vec())
        }
    }

    #[tokio::test]
    async fn test_unlock_automatically_unencrypted() {
        let security = FakeSecurity { password: None, attempts: AtomicUsize::new(0) };
        let out = unlock_automatically(&security, b"%PDF-plain").await.unwrap();
        assert_eq!(out, b"%PDF-plain");
        assert_eq!(security.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unlock_automatically_guesses_common_password() {
        let security = FakeSecurity { password: Some("qwerty"), attempts: AtomicUsize::new(0) };
        let out = unlock_automatically(&security, b"%PDF-").await.unwrap();
        assert_eq!(out, b"unlocked");
    }

    #[tokio::test]
    async fn test_unlock_automatically_strong_password() {
        let security = FakeSecurity {
            password: Some("correct horse battery staple"),
            attempts: AtomicUsize::new(0),
        };
        let result = unlock_automatically(&security, b"%PDF-").await;
        assert!(matches!(result, Err(PdfSecurityError::PasswordRequired)));
        assert_eq!(
            security.attempts.load(Ordering::SeqCst),
            COMMON_PASSWORDS.len() + 1
        );
    }

    #[tokio::test]
    async fn test_qpdf_lock_unlock_when_installed() {
        let scratch = tempfile::TempDir::new().unwrap();
        let qpdf = QpdfSecurity::new("qpdf", scratch.path());
        if !qpdf.is_available().await {
            return;
        }

        let plain = crate::test_support::sample_pdf(&["Hello locked world"]);
        let locked = qpdf.lock(&plain, "s3cret-pass", None).await.unwrap();

        assert!(matches!(
            qpdf.unlock(&locked, None).await,
            Err(PdfSecurityError::PasswordRequired)
        ));
        assert!(matches!(
            qpdf.unlock(&locked, Some("wrong")).await,
            Err(PdfSecurityError::InvalidPassword)
        ));

        let unlocked = qpdf.unlock(&locked, Some("s3cret-pass")).await.unwrap();
        assert!(has_pdf_header(&unlocked));
        assert!(lopdf::Document::load_mem(&unlocked).unwrap().trailer.get(b"Encrypt").is_err());

        // Scratch files are cleaned up
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
