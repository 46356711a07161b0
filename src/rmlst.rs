use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8Path;

use crate::config::Credentials;
use crate::error::RefsError;
use crate::fasta::{self, RMLST_COMBINED};

/// Authenticated download of the rMLST profile and alleles into a folder.
/// Callers judge the result by what lands on disk, not by the return value.
pub trait RmlstClient: Send + Sync {
    /// The command issued for `target_dir`, kept for the run report.
    fn command_line(&self, target_dir: &Utf8Path) -> String;
    fn download(&self, target_dir: &Utf8Path) -> Result<(), RefsError>;
}

/// Runs `rest_auth.pl` in the target folder and merges the downloaded
/// allele files into `rMLST_combined.fasta`.
#[derive(Clone)]
pub struct PerlAuthClient {
    credentials: Credentials,
}

impl PerlAuthClient {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    fn perl_program(&self) -> Result<PathBuf, RefsError> {
        let perl = Path::new(&self.credentials.perl);
        if perl.components().count() > 1 {
            return Ok(perl.to_path_buf());
        }
        find_in_path(&self.credentials.perl)
            .ok_or_else(|| RefsError::MissingTool(self.credentials.perl.clone()))
    }

    fn copy_access_token(&self, target_dir: &Utf8Path) -> Result<(), RefsError> {
        let token = &self.credentials.access_token_file;
        if !token.as_std_path().is_file() {
            return Err(RefsError::AuthScript(format!("access token not found at {token}")));
        }
        fs::copy(token.as_std_path(), target_dir.join("access_token").as_std_path())
            .map_err(|err| RefsError::Filesystem(format!("copy access token: {err}")))?;
        Ok(())
    }

    fn run_cmd(&self, program: &Path, args: &[String], cwd: &Path) -> Result<(), RefsError> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|err| RefsError::AuthScript(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", program.display())
        } else {
            stderr
        };
        Err(RefsError::AuthScript(message))
    }
}

impl RmlstClient for PerlAuthClient {
    fn command_line(&self, target_dir: &Utf8Path) -> String {
        format!(
            "cd {} && {} {} -a {}",
            target_dir,
            self.credentials.perl,
            self.credentials.auth_script,
            self.credentials.secret_file
        )
    }

    fn download(&self, target_dir: &Utf8Path) -> Result<(), RefsError> {
        self.copy_access_token(target_dir)?;
        let perl = self.perl_program()?;
        let args = vec![
            self.credentials.auth_script.to_string(),
            "-a".to_string(),
            self.credentials.secret_file.to_string(),
        ];
        tracing::info!(path = %target_dir, "running rMLST authenticated download");
        let script = self.run_cmd(&perl, &args, target_dir.as_std_path());

        // Partial downloads are merged too; the size check decides later.
        let summary = fasta::merge_allele_files(target_dir, RMLST_COMBINED)?;
        tracing::info!(
            files = summary.inputs.len(),
            records = summary.records,
            "combined rMLST alleles"
        );
        script
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    fn credentials(dir: &Utf8Path) -> Credentials {
        Credentials {
            auth_script: dir.join("rest_auth.pl"),
            secret_file: dir.join("secret.txt"),
            access_token_file: dir.join("access_token"),
            perl: "perl".to_string(),
        }
    }

    #[test]
    fn command_line_names_script_and_secret() {
        let client = PerlAuthClient::new(credentials(Utf8Path::new("/opt/auth")));
        let command = client.command_line(Utf8Path::new("/refs/rMLST/2024-05-20"));
        assert_eq!(
            command,
            "cd /refs/rMLST/2024-05-20 && perl /opt/auth/rest_auth.pl -a /opt/auth/secret.txt"
        );
    }

    #[test]
    fn missing_access_token_fails_before_running() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let client = PerlAuthClient::new(credentials(&root));
        let target = root.join("target");
        fs::create_dir(&target).unwrap();

        let err = client.download(&target).unwrap_err();
        assert_matches!(err, RefsError::AuthScript(_));
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }
}
