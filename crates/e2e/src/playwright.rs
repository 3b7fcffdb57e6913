//! Playwright browser driver
//!
//! Each submission renders a standalone Node script that logs in (when
//! credentials are configured), fills the workflow form, submits it and
//! prints a JSON verdict on stdout. Forms that show no result page are
//! reloaded after an accepted submission and their inputs read back.
//! With a screenshot directory set, a rejected or crashed submission leaves
//! a full-page capture behind.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use odc_common::{TargetConfig, WorkflowInput};

use crate::error::{E2eError, E2eResult, TargetError};
use crate::target::{ResponseStatus, TargetApplication, TargetResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(Browser::Chromium),
            "firefox" => Some(Browser::Firefox),
            "webkit" | "safari" => Some(Browser::Webkit),
            _ => None,
        }
    }
}

/// How a form control receives its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Fill,
    Select,
}

/// Page-level description of one workflow form
#[derive(Debug, Clone)]
struct FormPlan {
    path: &'static str,
    controls: Vec<(Control, &'static str, String)>,
    submit: &'static str,
    success: &'static str,
    failure: &'static str,
    /// (form field, selector whose text echoes it)
    echoes: Vec<(&'static str, &'static str)>,
    /// (form field, input read back after reloading the form)
    read_back: Vec<(&'static str, &'static str)>,
    login_first: bool,
}

fn form_for(input: &WorkflowInput) -> FormPlan {
    match input {
        WorkflowInput::Login(login) => FormPlan {
            path: "/index.htm",
            controls: vec![
                (Control::Fill, "input[name=\"username\"]", login.username.clone()),
                (Control::Fill, "input[name=\"password\"]", login.password.clone()),
            ],
            submit: "input[type=\"submit\"]",
            success: "a[href*=\"logout.htm\"]",
            failure: "p.error",
            echoes: vec![],
            read_back: vec![],
            login_first: false,
        },
        WorkflowInput::LoanApplication(loan) => FormPlan {
            path: "/requestloan.htm",
            controls: vec![
                (Control::Fill, "#amount", loan.amount.clone()),
                (Control::Fill, "#downPayment", loan.down_payment.clone()),
                (Control::Select, "#fromAccountId", loan.from_account.clone()),
            ],
            submit: "input[value=\"Apply Now\"]",
            success: "#loanRequestApproved",
            failure: "#loanRequestDenied, #requestLoanError, .error:visible",
            echoes: vec![],
            read_back: vec![],
            login_first: true,
        },
        WorkflowInput::AccountTransfer(transfer) => FormPlan {
            path: "/transfer.htm",
            controls: vec![
                (Control::Fill, "#amount", transfer.amount.clone()),
                (Control::Select, "#fromAccountId", transfer.from_account.clone()),
                (Control::Select, "#toAccountId", transfer.to_account.clone()),
            ],
            submit: "input[value=\"Transfer\"]",
            success: "#showResult",
            failure: "#showError, .error:visible",
            echoes: vec![
                ("amount", "#amountResult"),
                ("from_account", "#fromAccountIdResult"),
                ("to_account", "#toAccountIdResult"),
            ],
            read_back: vec![],
            login_first: true,
        },
        WorkflowInput::ProfileUpdate(profile) => FormPlan {
            path: "/updateprofile.htm",
            controls: vec![
                (Control::Fill, "input[id=\"customer.firstName\"]", profile.first_name.clone()),
                (Control::Fill, "input[id=\"customer.lastName\"]", profile.last_name.clone()),
                (Control::Fill, "input[id=\"customer.address.street\"]", profile.address.clone()),
                (Control::Fill, "input[id=\"customer.address.city\"]", profile.city.clone()),
                (Control::Fill, "input[id=\"customer.address.state\"]", profile.state.clone()),
                (Control::Fill, "input[id=\"customer.address.zipCode\"]", profile.zip_code.clone()),
                (Control::Fill, "input[id=\"customer.phoneNumber\"]", profile.phone.clone()),
            ],
            submit: "input[value=\"Update Profile\"]",
            success: "#updateProfileResult",
            failure: "#updateProfileError, span.error:visible",
            echoes: vec![],
            read_back: vec![
                ("first_name", "input[id=\"customer.firstName\"]"),
                ("last_name", "input[id=\"customer.lastName\"]"),
                ("address", "input[id=\"customer.address.street\"]"),
                ("city", "input[id=\"customer.address.city\"]"),
                ("state", "input[id=\"customer.address.state\"]"),
                ("zip_code", "input[id=\"customer.address.zipCode\"]"),
                ("phone", "input[id=\"customer.phoneNumber\"]"),
            ],
            login_first: true,
        },
    }
}

/// JSON string literal, valid as a JS expression
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Verdict printed by the generated script
#[derive(Debug, Deserialize)]
struct ScriptReport {
    #[serde(default)]
    accepted: Option<bool>,
    #[serde(default)]
    echo: BTreeMap<String, String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    screenshot: Option<PathBuf>,
}

/// Browser-driven target
pub struct PlaywrightTarget {
    ui_url: String,
    browser: Browser,
    headless: bool,
    credentials: Option<(String, String)>,
    timeout_ms: u64,
    screenshot_dir: Option<PathBuf>,
    submissions: AtomicU64,
}

impl PlaywrightTarget {
    pub fn new(config: &TargetConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Self::from_config(config)
    }

    /// Build without probing for a Playwright install
    pub fn from_config(config: &TargetConfig) -> E2eResult<Self> {
        let browser = Browser::parse(&config.browser).ok_or_else(|| {
            E2eError::Config(odc_common::ConfigError::InvalidValue {
                field: "target.browser".to_string(),
                reason: format!("unsupported browser '{}'", config.browser),
            })
        })?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Ok(Self {
            ui_url: config.ui_url.trim_end_matches('/').to_string(),
            browser,
            headless: config.headless,
            credentials,
            timeout_ms: config.request_timeout_ms,
            screenshot_dir: None,
            submissions: AtomicU64::new(0),
        })
    }

    /// Capture the page into `dir` when a submission is rejected or crashes
    pub fn with_screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = Some(dir);
        self
    }

    fn next_screenshot_path(&self, input: &WorkflowInput) -> Option<PathBuf> {
        let dir = self.screenshot_dir.as_ref()?;
        let sequence = self.submissions.fetch_add(1, Ordering::Relaxed) + 1;
        Some(dir.join(format!(
            "{}-{}-{:04}.png",
            input.workflow(),
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            sequence
        )))
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Render the Node script for one submission
    pub fn build_script(&self, input: &WorkflowInput, screenshot: Option<&Path>) -> String {
        let form = form_for(input);
        let mut script = String::new();

        let screenshot_path = screenshot
            .map(|path| js_str(&path.to_string_lossy()))
            .unwrap_or_else(|| "null".to_string());

        script.push_str(&format!(
            r#"
const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const page = await browser.newPage();
  page.setDefaultTimeout({timeout});
  const baseUrl = {base_url};
  const screenshotPath = {screenshot_path};
  const capture = async () => {{
    if (!screenshotPath) return null;
    try {{
      await page.screenshot({{ path: screenshotPath, fullPage: true }});
      return screenshotPath;
    }} catch (_) {{
      return null;
    }}
  }};

  try {{
"#,
            browser = self.browser.as_str(),
            headless = self.headless,
            timeout = self.timeout_ms,
            base_url = js_str(&self.ui_url),
            screenshot_path = screenshot_path,
        ));

        if form.login_first {
            if let Some((user, pass)) = &self.credentials {
                script.push_str(&format!(
                    r#"    await page.goto(baseUrl + '/index.htm');
    await page.fill('input[name="username"]', {user});
    await page.fill('input[name="password"]', {pass});
    await page.click('input[type="submit"]');
    await page.waitForLoadState('networkidle');
"#,
                    user = js_str(user),
                    pass = js_str(pass),
                ));
            }
        }

        script.push_str(&format!(
            "    await page.goto(baseUrl + {});\n",
            js_str(form.path)
        ));

        for (control, selector, value) in &form.controls {
            let line = match control {
                Control::Fill => format!(
                    "    await page.fill({}, {});\n",
                    js_str(selector),
                    js_str(value)
                ),
                Control::Select => format!(
                    "    await page.selectOption({}, {});\n",
                    js_str(selector),
                    js_str(value)
                ),
            };
            script.push_str(&line);
        }

        script.push_str(&format!(
            r#"    await page.click({submit});
    const outcome = await Promise.race([
      page.waitForSelector({success}, {{ state: 'visible' }}).then(() => true),
      page.waitForSelector({failure}, {{ state: 'visible' }}).then(() => false),
    ]);
    const echo = {{}};
"#,
            submit = js_str(form.submit),
            success = js_str(form.success),
            failure = js_str(form.failure),
        ));

        for (field, selector) in &form.echoes {
            script.push_str(&format!(
                "    if (outcome) {{ echo[{}] = ((await page.textContent({})) || '').trim(); }}\n",
                js_str(field),
                js_str(selector)
            ));
        }

        if !form.read_back.is_empty() {
            script.push_str(&format!(
                "    if (outcome) {{\n      await page.goto(baseUrl + {});\n      await page.waitForLoadState('networkidle');\n",
                js_str(form.path)
            ));
            for (field, selector) in &form.read_back {
                script.push_str(&format!(
                    "      echo[{}] = (await page.inputValue({})).trim();\n",
                    js_str(field),
                    js_str(selector)
                ));
            }
            script.push_str("    }\n");
        }

        script.push_str(&format!(
            r#"    const detail = outcome ? null : ((await page.textContent({failure})) || '').trim();
    const screenshot = outcome ? null : await capture();
    console.log(JSON.stringify({{ accepted: outcome, echo, detail, screenshot }}));
  }} catch (error) {{
    const screenshot = await capture();
    console.log(JSON.stringify({{ error: error.message, screenshot }}));
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            failure = js_str(form.failure),
        ));

        script
    }

    async fn run_script(&self, script: &str) -> Result<TargetResponse, TargetError> {
        let temp_dir = tempfile::tempdir().map_err(|e| TargetError::Protocol(e.to_string()))?;
        let script_path = temp_dir.path().join("submission.js");
        std::fs::write(&script_path, script).map_err(|e| TargetError::Protocol(e.to_string()))?;

        debug!("Running Playwright script: {}", script_path.display());

        let output = script_command("node", &script_path)
            .output()
            .await
            .map_err(|e| TargetError::Protocol(format!("failed to launch node: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report_line = stdout.lines().rev().find(|l| l.trim_start().starts_with('{'));

        match report_line {
            Some(line) => interpret_report(line),
            None => Err(TargetError::Protocol(format!(
                "script produced no verdict: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

/// Command running one generated script.
///
/// The child is killed when the returned future is dropped, so a cancelled
/// scenario does not leave a browser running against a deleted script.
fn script_command(program: &str, script: &Path) -> TokioCommand {
    let mut command = TokioCommand::new(program);
    command.arg(script).kill_on_drop(true);
    command
}

fn interpret_report(line: &str) -> Result<TargetResponse, TargetError> {
    let report: ScriptReport = serde_json::from_str(line)
        .map_err(|e| TargetError::Protocol(format!("unreadable verdict: {}", e)))?;

    if let Some(error) = report.error {
        if error.contains("net::ERR_") || error.contains("NS_ERROR_") || error.contains("ECONNREFUSED") {
            return Err(TargetError::Connection(error));
        }
        return Err(TargetError::Protocol(match report.screenshot {
            Some(path) => format!("{} (screenshot: {})", error, path.display()),
            None => error,
        }));
    }

    let status = match report.accepted {
        Some(true) => ResponseStatus::Accepted,
        Some(false) => ResponseStatus::Rejected,
        None => return Err(TargetError::Protocol("verdict missing 'accepted'".to_string())),
    };

    Ok(TargetResponse {
        status,
        echo: report.echo,
        detail: report.detail.filter(|d| !d.is_empty()),
        screenshot: report.screenshot,
    })
}

#[async_trait]
impl TargetApplication for PlaywrightTarget {
    fn name(&self) -> &str {
        "playwright"
    }

    async fn submit(&self, input: &WorkflowInput) -> Result<TargetResponse, TargetError> {
        let screenshot = self.next_screenshot_path(input);
        if let Some(dir) = screenshot.as_deref().and_then(Path::parent) {
            std::fs::create_dir_all(dir).map_err(|e| {
                TargetError::Protocol(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        let script = self.build_script(input, screenshot.as_deref());
        self.run_script(&script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odc_common::{AccountTransferInput, LoginInput, ProfileUpdateInput};

    fn target() -> PlaywrightTarget {
        PlaywrightTarget::from_config(&TargetConfig {
            username: Some("john".into()),
            password: Some("demo".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_script_escapes_hostile_values() {
        let script = target().build_script(
            &WorkflowInput::Login(LoginInput {
                username: "' OR '1'='1".into(),
                password: "<script>alert(1)</script>".into(),
            }),
            None,
        );
        assert!(script.contains(r#"page.fill("input[name=\"username\"]", "' OR '1'='1")"#));
        assert!(script.contains(r#"page.fill("input[name=\"password\"]", "<script>alert(1)</script>")"#));
        // Login form is the workflow itself
        assert_eq!(script.matches("/index.htm").count(), 1);
    }

    #[test]
    fn test_script_logs_in_before_transfer() {
        let script = target().build_script(
            &WorkflowInput::AccountTransfer(AccountTransferInput {
                from_account: "13344".into(),
                to_account: "13455".into(),
                amount: "10.00".into(),
            }),
            None,
        );
        let login = script.find("/index.htm").unwrap();
        let transfer = script.find("/transfer.htm").unwrap();
        assert!(login < transfer);
        assert!(script.contains("selectOption(\"#toAccountId\", \"13455\")"));
    }

    fn profile() -> WorkflowInput {
        WorkflowInput::ProfileUpdate(ProfileUpdateInput {
            customer_id: "12212".into(),
            first_name: "Zoë".into(),
            last_name: "O'Brien".into(),
            address: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: "62701".into(),
            phone: "555-0100".into(),
        })
    }

    #[test]
    fn test_profile_update_reads_form_back() {
        let script = target().build_script(&profile(), None);
        let submit = script.find("Update Profile").unwrap();
        let reload = script.rfind("await page.goto(baseUrl + \"/updateprofile.htm\")").unwrap();
        assert!(submit < reload);
        for field in ["first_name", "last_name", "address", "city", "state", "zip_code", "phone"] {
            assert!(script.contains(&format!("echo[\"{}\"] = (await page.inputValue(", field)));
        }
    }

    #[test]
    fn test_transfer_reads_result_page_without_reload() {
        let script = target().build_script(
            &WorkflowInput::AccountTransfer(AccountTransferInput {
                from_account: "13344".into(),
                to_account: "13455".into(),
                amount: "10.00".into(),
            }),
            None,
        );
        assert!(!script.contains("inputValue"));
        assert!(script.contains("page.textContent(\"#amountResult\")"));
    }

    #[test]
    fn test_interpret_profile_read_back() {
        let line = r#"{"accepted": true, "echo": {"first_name": "Zoë", "city": "Springfield"}, "detail": null}"#;
        let response = interpret_report(line).unwrap();
        assert!(response.is_accepted());
        assert_eq!(response.echo["first_name"], "Zoë");
        assert_eq!(response.screenshot, None);
    }

    #[test]
    fn test_screenshot_only_when_configured() {
        let script = target().build_script(&profile(), None);
        assert!(script.contains("const screenshotPath = null;"));

        let path = Path::new("test-results/screenshots/profile-update-0001.png");
        let script = target().build_script(&profile(), Some(path));
        assert!(script.contains(
            "const screenshotPath = \"test-results/screenshots/profile-update-0001.png\";"
        ));
        assert!(script.contains("page.screenshot({ path: screenshotPath, fullPage: true })"));
        assert!(script.contains("const screenshot = outcome ? null : await capture();"));
    }

    #[test]
    fn test_screenshot_paths_are_unique_per_submission() {
        let dir = PathBuf::from("out/screenshots");
        let target = target().with_screenshot_dir(dir.clone());
        let first = target.next_screenshot_path(&profile()).unwrap();
        let second = target.next_screenshot_path(&profile()).unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with(&dir));
        assert!(first.to_string_lossy().ends_with("-0001.png"));

        assert_eq!(self::target().next_screenshot_path(&profile()), None);
    }

    #[test]
    fn test_interpret_rejection_keeps_screenshot() {
        let line = r#"{"accepted": false, "echo": {}, "detail": "Invalid amount", "screenshot": "shots/transfer.png"}"#;
        let response = interpret_report(line).unwrap();
        assert_eq!(response.screenshot, Some(PathBuf::from("shots/transfer.png")));

        let err = interpret_report(r#"{"error": "Timeout 10000ms exceeded", "screenshot": "shots/crash.png"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            TargetError::Protocol("Timeout 10000ms exceeded (screenshot: shots/crash.png)".into())
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_script_process_killed_when_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("slow.sh");
        std::fs::write(
            &script,
            format!("echo $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();

        let run = script_command("sh", &script).output();
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(500), run).await;
        assert!(timed_out.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = Path::new("/proc").join(&pid).join("stat");
        let mut alive = true;
        for _ in 0..50 {
            alive = match std::fs::read_to_string(&stat) {
                // Zombie until the runtime reaps it
                Ok(content) => !content.contains(") Z "),
                Err(_) => false,
            };
            if !alive {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!alive, "child {} still running", pid);
    }

    #[test]
    fn test_unknown_browser_rejected() {
        let result = PlaywrightTarget::from_config(&TargetConfig {
            browser: "netscape".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(E2eError::Config(_))));
    }

    #[test]
    fn test_interpret_network_error_is_transient() {
        let err = interpret_report(r#"{"error": "page.goto: net::ERR_CONNECTION_REFUSED"}"#).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_interpret_rejection() {
        let response = interpret_report(r#"{"accepted": false, "echo": {}, "detail": "Invalid amount"}"#).unwrap();
        assert_eq!(response.status, ResponseStatus::Rejected);
        assert_eq!(response.detail.as_deref(), Some("Invalid amount"));
    }
}
