//! `bubu-ctl`: command-line client for bubu-do.
//!
//! Signed out, tasks live in a local JSON file.  After `login` they are
//! merged into the account and every command talks to the server instead.
//!
//! # Usage
//!
//! ```text
//! bubu-ctl [--server <url>] <command>
//!
//! Commands:
//!   add <title...> [--breakdown] [--prompt A|B]
//!   list [--todo | --done]
//!   done <id>
//!   rm <id>
//!   register <name> <email> <password>
//!   login <email> <password>
//!   logout
//!   health
//! ```
//!
//! Server resolution order:
//!   1. `--server <url>` flag
//!   2. `$BUBU_SERVER`
//!   3. the server of the current session
//!   4. `http://127.0.0.1:5001`

use std::process;

use chrono::{Local, NaiveDate};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use bubu_do::dates::extract_due_date;
use bubu_do::local::{LocalFile, LocalStore, Session};
use bubu_do::model::{NewSubtask, Task, TaskStatus};
use bubu_do::sync::{LocalSubtask, LocalTask};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthReply {
    email: String,
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BreakdownReply {
    sub_tasks: Vec<LocalSubtask>,
    #[serde(default)]
    total_estimated_time: String,
    #[serde(default)]
    due_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct SyncReply {
    merged: usize,
}

#[derive(Deserialize)]
struct ErrorReply {
    message: String,
}

// ── CLI arg parsing ────────────────────────────────────────────────────────

/// Which sections `list` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Show {
    All,
    Todo,
    Done,
}

struct Args {
    server: Option<String>,
    command: Option<String>,
    rest: Vec<String>,
    breakdown: bool,
    prompt: Option<String>,
    show: Show,
}

fn parse_args() -> Args {
    let mut args =
        Args { server: None, command: None, rest: Vec::new(), breakdown: false, prompt: None, show: Show::All };
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" | "-s" => args.server = iter.next(),
            "--breakdown" | "-b" => args.breakdown = true,
            "--prompt" | "-p" => args.prompt = iter.next(),
            "--todo" => args.show = Show::Todo,
            "--done" => args.show = Show::Done,
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--" => {
                args.rest.extend(iter);
                break;
            }
            _ if args.command.is_none() => args.command = Some(arg),
            _ => args.rest.push(arg),
        }
    }
    args
}

fn print_help() {
    eprintln!("usage: bubu-ctl [--server <url>] <command>");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  add <title...> [--breakdown] [--prompt A|B]   add a task, optionally AI-split");
    eprintln!("  list [--todo | --done]                        show open and finished tasks");
    eprintln!("  done <id>                                     toggle a task's completion");
    eprintln!("  rm <id>                                       delete a task");
    eprintln!("  register <name> <email> <password>            create an account and sign in");
    eprintln!("  login <email> <password>                      sign in and upload local tasks");
    eprintln!("  logout                                        sign out");
    eprintln!("  health                                        check the server");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  --server, -s <url>   override server url");
    eprintln!("  --help,   -h         print this help");
    eprintln!();
    eprintln!("server resolution: --server, $BUBU_SERVER, session server, {DEFAULT_SERVER}");
}

// ── Server access ─────────────────────────────────────────────────────────

struct Remote {
    http: Client,
    server: String,
}

impl Remote {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.trim_end_matches('/'))
    }
}

/// Turn a non-2xx reply into the server's `message`.
fn check(resp: Response) -> Result<Response, String> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorReply>(&text).map(|e| e.message).unwrap_or(text);
    Err(format!("server returned {status}: {message}"))
}

fn send(req: RequestBuilder) -> Result<Response, String> {
    req.send().map_err(|e| format!("request failed: {e}\n  is the server running?"))
}

/// Sends authenticated requests, refreshing the access token once on 401.
struct Authed<'a> {
    remote: &'a Remote,
    session: &'a mut Session,
}

impl Authed<'_> {
    fn call<F>(&mut self, build: F) -> Result<Response, String>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let resp = send(build(&self.remote.http).bearer_auth(&self.session.access_token))?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check(resp);
        }

        let reply = send(
            self.remote
                .http
                .post(self.remote.url("/api/auth/refresh-token"))
                .json(&json!({ "refreshToken": self.session.refresh_token })),
        )?;
        let reply: Value = check(reply)
            .map_err(|_| "session expired, run 'bubu-ctl login' again".to_string())?
            .json()
            .map_err(|e| format!("bad refresh reply: {e}"))?;
        let access = reply["accessToken"]
            .as_str()
            .ok_or("bad refresh reply: missing accessToken")?;
        self.session.access_token = access.to_string();

        check(send(build(&self.remote.http).bearer_auth(&self.session.access_token))?)
    }
}

fn resolve_task_id(authed: &mut Authed<'_>, prefix: &str) -> Result<String, String> {
    let url = authed.remote.url("/api/tasks");
    let tasks: Vec<Task> = authed
        .call(|c| c.get(&url))?
        .json()
        .map_err(|e| format!("bad task list: {e}"))?;
    let matches: Vec<&Task> = tasks.iter().filter(|t| t.id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => Err(format!("no task with id '{prefix}'")),
        _ => Err(format!("id '{prefix}' is ambiguous")),
    }
}

// ── Output ────────────────────────────────────────────────────────────────

fn mark(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}

fn details(due: Option<NaiveDate>, estimate: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(d) = due {
        parts.push(format!("due {d}"));
    }
    if let Some(e) = estimate.filter(|e| !e.is_empty()) {
        parts.push(e.to_string());
    }
    if parts.is_empty() { String::new() } else { format!("  ({})", parts.join(", ")) }
}

fn print_local(task: &LocalTask) {
    println!(
        "{:>4}  {} {}{}",
        task.id,
        mark(task.completed),
        task.title,
        details(task.due_date, task.total_estimated_time.as_deref())
    );
    for sub in &task.sub_tasks {
        let est = sub.estimated_time.as_deref().map(|e| format!(" ({e})")).unwrap_or_default();
        println!("         {} {}{est}", mark(sub.completed), sub.title);
    }
}

fn print_remote(task: &Task) {
    println!(
        "{:>8}  {} {}{}",
        &task.id[..task.id.len().min(8)],
        mark(task.is_completed()),
        task.title,
        details(task.due_date, task.total_estimated_time.as_deref())
    );
    for sub in &task.subtasks {
        println!("             {} {}", mark(sub.status == TaskStatus::Completed), sub.title);
    }
}

/// Open tasks first, finished ones second, each keeping list order.
fn split_done<T>(tasks: &[T], is_done: impl Fn(&T) -> bool) -> (Vec<&T>, Vec<&T>) {
    tasks.iter().partition(|t| !is_done(*t))
}

fn print_section<T>(heading: &str, items: &[&T], print: &impl Fn(&T)) {
    println!("{heading} ({})", items.len());
    if items.is_empty() {
        println!("  nothing here");
    }
    items.iter().for_each(|t| print(*t));
    println!();
}

fn print_grouped<T>(tasks: &[T], show: Show, is_done: impl Fn(&T) -> bool, print: impl Fn(&T)) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    let (todo, done) = split_done(tasks, is_done);
    if show != Show::Done {
        print_section("To Do", &todo, &print);
    }
    if show != Show::Todo {
        print_section("My Accomplishments", &done, &print);
    }
}

// ── Commands ──────────────────────────────────────────────────────────────

fn cmd_add(remote: &Remote, file: &mut LocalFile, args: &Args) -> Result<(), String> {
    let title = args.rest.join(" ");
    if title.trim().is_empty() {
        return Err("usage: bubu-ctl add <title...> [--breakdown]".into());
    }

    if let Some(session) = file.session.as_mut() {
        let mut authed = Authed { remote, session };
        let url = remote.url("/api/tasks");
        let task: Task = authed
            .call(|c| c.post(&url).json(&json!({ "title": title })))?
            .json()
            .map_err(|e| format!("bad task reply: {e}"))?;
        let task = if args.breakdown {
            let url = remote.url(&format!("/api/tasks/{}/breakdown", task.id));
            let body = json!({ "style": args.prompt.as_deref().unwrap_or("A").to_uppercase() });
            let reply: Value = authed.call(|c| c.post(&url).json(&body))?.json().map_err(|e| e.to_string())?;
            if let Some(tip) = reply["tip"].as_str() {
                println!("tip: {tip}");
            }
            serde_json::from_value(reply["task"].clone()).map_err(|e| format!("bad breakdown reply: {e}"))?
        } else {
            task
        };
        print_remote(&task);
        return Ok(());
    }

    let (subtasks, estimate, due) = if args.breakdown {
        let body = json!({
            "title": title,
            "style": args.prompt.as_deref().unwrap_or("A").to_uppercase(),
        });
        let reply: BreakdownReply = check(send(remote.http.post(remote.url("/api/breakdown")).json(&body))?)?
            .json()
            .map_err(|e| format!("bad breakdown reply: {e}"))?;
        let subtasks = reply
            .sub_tasks
            .into_iter()
            .map(|s| NewSubtask {
                title: s.title,
                link: s.link,
                estimated_time: s.estimated_time,
                depends_on: s.depends_on,
                ..NewSubtask::default()
            })
            .collect();
        let estimate = Some(reply.total_estimated_time).filter(|t| !t.is_empty());
        (subtasks, estimate, reply.due_date)
    } else {
        (Vec::new(), None, extract_due_date(&title, Local::now().date_naive()))
    };

    print_local(file.add(&title, subtasks, estimate, due));
    Ok(())
}

fn cmd_list(remote: &Remote, file: &mut LocalFile, show: Show) -> Result<(), String> {
    if let Some(session) = file.session.as_mut() {
        let mut authed = Authed { remote, session };
        let url = remote.url("/api/tasks");
        let tasks: Vec<Task> = authed.call(|c| c.get(&url))?.json().map_err(|e| e.to_string())?;
        print_grouped(&tasks, show, Task::is_completed, print_remote);
        return Ok(());
    }
    print_grouped(&file.tasks, show, |t| t.completed, print_local);
    Ok(())
}

fn cmd_done(remote: &Remote, file: &mut LocalFile, id: &str) -> Result<(), String> {
    if let Some(session) = file.session.as_mut() {
        let mut authed = Authed { remote, session };
        let full = resolve_task_id(&mut authed, id)?;
        let url = remote.url(&format!("/api/tasks/{full}/toggle"));
        let task: Task = authed.call(|c| c.post(&url))?.json().map_err(|e| e.to_string())?;
        print_remote(&task);
        return Ok(());
    }
    let done = file.toggle(id).ok_or_else(|| format!("no task with id '{id}'"))?;
    println!("ok  task {id} {}", if done { "completed" } else { "reopened" });
    Ok(())
}

fn cmd_rm(remote: &Remote, file: &mut LocalFile, id: &str) -> Result<(), String> {
    if let Some(session) = file.session.as_mut() {
        let mut authed = Authed { remote, session };
        let full = resolve_task_id(&mut authed, id)?;
        let url = remote.url(&format!("/api/tasks/{full}"));
        authed.call(|c| c.delete(&url))?;
        println!("ok  task deleted");
        return Ok(());
    }
    if !file.remove(id) {
        return Err(format!("no task with id '{id}'"));
    }
    println!("ok  task deleted");
    Ok(())
}

/// Store the session, then upload local tasks and clear them.
fn sign_in(remote: &Remote, file: &mut LocalFile, store: &LocalStore, reply: AuthReply) -> Result<(), String> {
    let session = Session {
        server: remote.server.clone(),
        email: reply.email,
        access_token: reply.access_token,
        refresh_token: reply.refresh_token,
    };
    println!("ok  signed in as {}", session.email);
    file.session = Some(session);
    store.save(file).map_err(|e| e.to_string())?;

    if file.tasks.is_empty() {
        return Ok(());
    }
    let tasks = file.tasks.clone();
    let Some(session) = file.session.as_mut() else {
        return Ok(());
    };
    let mut authed = Authed { remote, session };
    let url = remote.url("/api/sync");
    let reply: SyncReply = authed
        .call(|c| c.post(&url).json(&json!({ "tasks": tasks })))?
        .json()
        .map_err(|e| format!("bad sync reply: {e}"))?;
    println!("ok  {} local task(s) merged into your account", reply.merged);
    file.clear_tasks();
    Ok(())
}

fn cmd_login(remote: &Remote, file: &mut LocalFile, store: &LocalStore, rest: &[String]) -> Result<(), String> {
    let [email, password] = rest else {
        return Err("usage: bubu-ctl login <email> <password>".into());
    };
    let body = json!({ "email": email, "password": password });
    let reply: AuthReply = check(send(remote.http.post(remote.url("/api/auth/login")).json(&body))?)?
        .json()
        .map_err(|e| format!("bad login reply: {e}"))?;
    sign_in(remote, file, store, reply)
}

fn cmd_register(remote: &Remote, file: &mut LocalFile, store: &LocalStore, rest: &[String]) -> Result<(), String> {
    let [name, email, password] = rest else {
        return Err("usage: bubu-ctl register <name> <email> <password>".into());
    };
    let body = json!({ "name": name, "email": email, "password": password });
    let reply: AuthReply = check(send(remote.http.post(remote.url("/api/auth/register")).json(&body))?)?
        .json()
        .map_err(|e| format!("bad register reply: {e}"))?;
    sign_in(remote, file, store, reply)
}

fn cmd_logout(remote: &Remote, file: &mut LocalFile) -> Result<(), String> {
    let Some(session) = file.session.take() else {
        println!("ok  not signed in");
        return Ok(());
    };
    // The local session is dropped even if the server is unreachable.
    let body = json!({ "refreshToken": session.refresh_token });
    if let Err(e) = send(remote.http.post(remote.url("/api/auth/logout")).json(&body)).and_then(check) {
        eprintln!("warning: {e}");
    }
    println!("ok  signed out {}", session.email);
    Ok(())
}

fn cmd_health(remote: &Remote) -> Result<(), String> {
    let reply: Value = check(send(remote.http.get(remote.url("/health")))?)?
        .json()
        .map_err(|e| e.to_string())?;
    println!(
        "{}  {}",
        reply["status"].as_str().unwrap_or("?"),
        reply["message"].as_str().unwrap_or_default()
    );
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() {
    let args = parse_args();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    let Some(command) = args.command.clone() else {
        return Err("no command given\n  run 'bubu-ctl --help' for usage".into());
    };

    let store = LocalStore::default_location().map_err(|e| e.to_string())?;
    let mut file = store.load().map_err(|e| e.to_string())?;

    let server = args
        .server
        .clone()
        .or_else(|| std::env::var("BUBU_SERVER").ok().filter(|s| !s.is_empty()))
        .or_else(|| file.session.as_ref().map(|s| s.server.clone()))
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let http = Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| format!("cannot build HTTP client: {e}"))?;
    let remote = Remote { http, server };

    let first = || args.rest.first().map(String::as_str).ok_or(format!("usage: bubu-ctl {command} <id>"));

    let result = match command.as_str() {
        "add" => cmd_add(&remote, &mut file, &args),
        "list" | "ls" => cmd_list(&remote, &mut file, args.show),
        "done" | "toggle" => first().and_then(|id| cmd_done(&remote, &mut file, id)),
        "rm" | "delete" => first().and_then(|id| cmd_rm(&remote, &mut file, id)),
        "login" => cmd_login(&remote, &mut file, &store, &args.rest),
        "register" => cmd_register(&remote, &mut file, &store, &args.rest),
        "logout" => cmd_logout(&remote, &mut file),
        "health" => cmd_health(&remote),
        other => Err(format!("unknown command: {other}\n  run 'bubu-ctl --help' for usage")),
    };

    // Persist local edits and refreshed tokens even when the command failed
    // part-way.
    store.save(&file).map_err(|e| e.to_string())?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: &str, completed: bool) -> LocalTask {
        LocalTask {
            id: id.into(),
            title: format!("task {id}"),
            completed,
            sub_tasks: Vec::new(),
            total_estimated_time: None,
            due_date: None,
        }
    }

    #[test]
    fn list_splits_open_from_finished_in_order() {
        let tasks = vec![local("1", true), local("2", false), local("3", true), local("4", false)];
        let (todo, done) = split_done(&tasks, |t| t.completed);
        let ids = |v: &[&LocalTask]| v.iter().map(|t| t.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&todo), ["2", "4"]);
        assert_eq!(ids(&done), ["1", "3"]);
    }

    #[test]
    fn list_with_nothing_finished() {
        let tasks = vec![local("1", false)];
        let (todo, done) = split_done(&tasks, |t| t.completed);
        assert_eq!(todo.len(), 1);
        assert!(done.is_empty());
    }
}
