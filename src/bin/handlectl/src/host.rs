use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use miette::IntoDiagnostic;
use user_handles::{ObjectRef, ObjectType, Owner, TableLimits, UserHandle};
use user_handles_srv::{Caller, ServerConfig, UserSession};

use crate::{parse_handle, parse_num, parse_type};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Alloc(Caller, ObjectType),
    Free(Caller, UserHandle),
    Create(Owner, ObjectType, ObjectRef),
    Destroy(UserHandle),
    Exit(u32),
    Quit,
}

fn parse_id(s: Option<&str>) -> Result<u32, String> {
    let s = s.ok_or("missing argument")?;
    u32::try_from(parse_num(s)?).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

fn arg<'a>(s: Option<&'a str>) -> Result<&'a str, String> {
    s.ok_or_else(|| "missing argument".to_string())
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let cmd = match verb {
        "alloc" => {
            let pid = parse_id(words.next())?;
            let tid = parse_id(words.next())?;
            Command::Alloc(Caller::new(pid, tid), parse_type(arg(words.next())?)?)
        }
        "free" => {
            let pid = parse_id(words.next())?;
            Command::Free(Caller::new(pid, 0), parse_handle(arg(words.next())?)?)
        }
        "create" => {
            let pid = parse_id(words.next())?;
            let tid = parse_id(words.next())?;
            let ty = parse_type(arg(words.next())?)?;
            let object = parse_num(arg(words.next())?)?;
            Command::Create(Owner::new(pid, tid), ty, ObjectRef::new(object))
        }
        "destroy" => Command::Destroy(parse_handle(arg(words.next())?)?),
        "exit" => Command::Exit(parse_id(words.next())?),
        "quit" => Command::Quit,
        _ => return Err(format!("unknown command '{}'", verb)),
    };
    if words.next().is_some() {
        return Err("too many arguments".to_string());
    }
    Ok(Some(cmd))
}

fn execute(session: &UserSession, cmd: Command) -> String {
    match cmd {
        Command::Alloc(caller, ty) => match session.alloc_user_handle(caller, ty) {
            Ok(handle) => format!("{}", handle),
            Err(status) => format!("error: {}", status),
        },
        Command::Free(caller, handle) => match session.free_user_handle(caller, handle) {
            Ok(()) => "ok".to_string(),
            Err(status) => format!("error: {}", status),
        },
        Command::Create(owner, ty, object) => match session.create_object(owner, object, ty) {
            Ok(handle) => format!("{}", handle),
            Err(e) => format!("error: {}", e),
        },
        Command::Destroy(handle) => match session.destroy_object(handle) {
            Ok(object) => format!("{}", object),
            Err(e) => format!("error: {}", e),
        },
        Command::Exit(pid) => format!("freed {}", session.process_exited(pid)),
        Command::Quit => String::new(),
    }
}

pub fn run(path: PathBuf, limits: TableLimits) -> miette::Result<()> {
    let config = ServerConfig::default().limits(limits).file(&path);
    let session = UserSession::new(&config).into_diagnostic()?;
    tracing::info!("hosting {}; commands: alloc, free, create, destroy, exit, quit", path.display());

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line.into_diagnostic()?;
        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(cmd)) => writeln!(stdout, "{}", execute(&session, cmd)).into_diagnostic()?,
            Ok(None) => {}
            Err(e) => writeln!(stdout, "error: {}", e).into_diagnostic()?,
        }
        stdout.flush().into_diagnostic()?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(
            parse_command("alloc 5 6 menu"),
            Ok(Some(Command::Alloc(Caller::new(5, 6), ObjectType::MENU)))
        );
        assert_eq!(
            parse_command("free 5 0x10020"),
            Ok(Some(Command::Free(
                Caller::new(5, 0),
                UserHandle::new(0x20, 1)
            )))
        );
        assert_eq!(
            parse_command("create 1 2 window 0x1000"),
            Ok(Some(Command::Create(
                Owner::new(1, 2),
                ObjectType::WINDOW,
                ObjectRef::new(0x1000)
            )))
        );
        assert_eq!(parse_command("exit 9"), Ok(Some(Command::Exit(9))));
        assert_eq!(parse_command("   "), Ok(None));
        assert!(parse_command("alloc 5").is_err());
        assert!(parse_command("quit now").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn commands() {
        let limits = TableLimits::new(0x20, 0x30).unwrap();
        let session = UserSession::new(&ServerConfig::default().limits(limits)).unwrap();
        let run = |line: &str| execute(&session, parse_command(line).unwrap().unwrap());
        assert_eq!(run("alloc 5 6 menu"), "0x00010020");
        assert_eq!(run("alloc 5 6 window"), "error: invalid parameter");
        assert_eq!(run("create 1 1 window 0x99"), "0x00010021");
        assert_eq!(run("free 5 0x00010021"), "error: invalid handle");
        assert_eq!(run("destroy 0x00010021"), "0x99");
        assert_eq!(run("exit 5"), "freed 1");
        assert_eq!(run("free 5 0x00010020"), "error: invalid handle");
    }
}
