//! Interactive credential and second-factor prompts on the terminal.

use std::io::{self, BufRead, IsTerminal, Write};

use secrecy::Secret;

use weblogin_core::{
    AuthError, Credentials, FactorKind, LoginHandler, SecondFactorChoice, SecondFactorOption,
};

/// How the password is read.
enum PasswordInput {
    /// From the controlling terminal without echo.
    Terminal,
    /// As the next line of the regular input (scripted sessions).
    Line,
}

/// [`LoginHandler`] that prompts on `output` and reads answers from `input`.
pub struct ConsoleHandler<R, W> {
    input: R,
    output: W,
    username: Option<String>,
    password_input: PasswordInput,
}

impl ConsoleHandler<io::StdinLock<'static>, io::Stdout> {
    /// Handler on stdin/stdout.
    ///
    /// The password prompt does not echo when stdin is a terminal; piped
    /// stdin supplies the password as a plain line.
    pub fn stdio(username: Option<String>) -> Self {
        let stdin = io::stdin();
        let password_input = if stdin.is_terminal() {
            PasswordInput::Terminal
        } else {
            PasswordInput::Line
        };
        Self {
            input: stdin.lock(),
            output: io::stdout(),
            username,
            password_input,
        }
    }
}

impl<R: BufRead, W: Write> ConsoleHandler<R, W> {
    /// Handler that reads every answer, the password included, from `input`.
    pub fn scripted(input: R, output: W, username: Option<String>) -> Self {
        Self {
            input,
            output,
            username,
            password_input: PasswordInput::Line,
        }
    }

    fn prompt(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before an answer was given",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn password(&mut self) -> io::Result<String> {
        match self.password_input {
            PasswordInput::Terminal => {
                self.output.flush()?;
                rpassword::prompt_password("password: ")
            }
            PasswordInput::Line => self.prompt("password: "),
        }
    }

    fn choose_index(&mut self, count: usize) -> io::Result<usize> {
        loop {
            let answer = self.prompt("option: ")?;
            match answer.trim().parse::<usize>() {
                Ok(choice) if (1..=count).contains(&choice) => return Ok(choice - 1),
                _ => writeln!(self.output, "Enter a number from 1 to {count}.")?,
            }
        }
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> LoginHandler for ConsoleHandler<R, W> {
    fn credentials(&mut self) -> Result<Credentials, AuthError> {
        let identity = match self.username.clone() {
            Some(username) => username,
            None => self.prompt("username: ")?,
        };
        let password = self.password()?;
        Ok(Credentials::new(identity, password))
    }

    fn report_credential_error(&mut self, message: &str) {
        let _ = writeln!(self.output, "{message}");
    }

    fn on_second_factor_start(&mut self, identity: &str) {
        let _ = writeln!(self.output, "Two-factor login for {identity}");
    }

    fn on_second_factor_failed(&mut self, option: &SecondFactorOption) {
        let _ = if option.factor == FactorKind::Sms {
            writeln!(
                self.output,
                "A text message with new passcodes was sent. Choose a Passcode option next.\n"
            )
        } else {
            writeln!(self.output)
        };
    }

    fn choose_second_factor(
        &mut self,
        options: &[SecondFactorOption],
    ) -> Result<SecondFactorChoice, AuthError> {
        writeln!(self.output, "Select one of the following options:")?;
        for (index, option) in options.iter().enumerate() {
            writeln!(self.output, " {}. {}", index + 1, option.description)?;
        }
        writeln!(self.output)?;

        let option = options[self.choose_index(options.len())?].clone();
        let passcode = if option.requires_passcode() {
            Some(Secret::new(self.prompt("passcode: ")?.trim().to_string()))
        } else {
            None
        };
        Ok(SecondFactorChoice { option, passcode })
    }
}
