use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "RSAKEEP_PASSWORD";

fn from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn read_line(handle: &mut impl BufRead) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    handle.read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Vault password for an existing vault.
///
/// Sources, in order: `RSAKEEP_PASSWORD`, one line of piped stdin, a TTY prompt.
pub fn read_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env() {
        return Ok(pw);
    }

    let stdin = io::stdin();
    let pw = if stdin.is_terminal() {
        Zeroizing::new(rpassword::prompt_password("Vault password: ")?)
    } else {
        read_line(&mut stdin.lock())?
    };

    if pw.is_empty() {
        bail!("No password provided");
    }
    Ok(pw)
}

/// Password for a vault being created; interactive and piped input must repeat it.
pub fn read_new_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env() {
        return Ok(pw);
    }

    let stdin = io::stdin();
    let (pw1, pw2) = if stdin.is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password("New vault password: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm password: ")?),
        )
    } else {
        let mut handle = stdin.lock();
        (read_line(&mut handle)?, read_line(&mut handle)?)
    };

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }
    if pw1 != pw2 {
        bail!("passwords do not match");
    }
    Ok(pw1)
}
