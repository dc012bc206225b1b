use std::str::FromStr;
use thiserror::Error;
use tilde_session::settings::{EnergyUnit, PhononUnit};
use tilde_session::{
    ObjectHash, Pane, SessionController, SessionError, SettingsStore, Transport, Units,
    ViewRenderer,
};

pub const HELP: &str = "\
commands:
  go <fragment>            navigate (e.g. `go mydb/browse`)
  tags <tid>...            narrow the tag cloud (no ids resets it)
  find <tid>...            browse objects having all given tags
  open <hash>              open or close an object panel
  close <hash> | closeall  close panels
  pane <hash> <pane>       summary 3dview phonons ph_dos e_dos ph_bands e_bands optstory estory
  ls <path>                list a server-side directory
  scan <path>              add one file
  scandir <path> [-r]      add a directory, recursively with -r
  db <name>                switch database
  mkdb <name> | rmdb <name>
  select <hash>            toggle row selection
  copy <db> | delete | export
  units <au|eV|Ry> <cm^-1|THz>
  cols <id>...             set table columns
  path <dir>               set the local data directory
  width <px>               apply viewport width
  restart | terminate | reconnect | quit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArg(&'static str),
    #[error("invalid argument `{0}`")]
    BadArg(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Go(String),
    FilterTags(Vec<u64>),
    BrowseTags(Vec<u64>),
    Open(ObjectHash),
    Close(ObjectHash),
    CloseAll,
    Pane(ObjectHash, Pane),
    List(String),
    Scan(String),
    ScanDir { path: String, recursive: bool },
    SwitchDb(String),
    CreateDb(String),
    DeleteDb(String),
    Select(String),
    Copy(String),
    Delete,
    Export,
    Units(Units),
    Cols(Vec<u32>),
    Path(String),
    Width(u32),
    Restart,
    Terminate,
    Reconnect,
}

fn arg<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str, CommandError> {
    args.next().ok_or(CommandError::MissingArg(name))
}

fn hash_arg<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<ObjectHash, CommandError> {
    let raw = arg(args, name)?;
    ObjectHash::parse(raw).ok_or_else(|| CommandError::BadArg(raw.to_string()))
}

fn numbers<'a, N: FromStr>(args: impl Iterator<Item = &'a str>) -> Result<Vec<N>, CommandError> {
    args.map(|a| a.parse().map_err(|_| CommandError::BadArg(a.to_string())))
        .collect()
}

fn parsed<T: FromStr>(raw: &str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| CommandError::BadArg(raw.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut args = line.split_whitespace();
        let Some(head) = args.next() else {
            return Err(CommandError::Unknown(String::new()));
        };
        let cmd = match head {
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "go" => Command::Go(arg(&mut args, "go")?.to_string()),
            "tags" => Command::FilterTags(numbers(args)?),
            "find" => Command::BrowseTags(numbers(args)?),
            "open" => Command::Open(hash_arg(&mut args, "open")?),
            "close" => Command::Close(hash_arg(&mut args, "close")?),
            "closeall" => Command::CloseAll,
            "pane" => {
                let hash = hash_arg(&mut args, "pane")?;
                Command::Pane(hash, parsed(arg(&mut args, "pane")?)?)
            }
            "ls" => Command::List(args.next().unwrap_or_default().to_string()),
            "scan" => Command::Scan(arg(&mut args, "scan")?.to_string()),
            "scandir" => {
                let path = arg(&mut args, "scandir")?.to_string();
                Command::ScanDir {
                    path,
                    recursive: args.next() == Some("-r"),
                }
            }
            "db" => Command::SwitchDb(arg(&mut args, "db")?.to_string()),
            "mkdb" => Command::CreateDb(arg(&mut args, "mkdb")?.to_string()),
            "rmdb" => Command::DeleteDb(arg(&mut args, "rmdb")?.to_string()),
            "select" => Command::Select(arg(&mut args, "select")?.to_string()),
            "copy" => Command::Copy(arg(&mut args, "copy")?.to_string()),
            "delete" => Command::Delete,
            "export" => Command::Export,
            "units" => {
                let energy: EnergyUnit = parsed(arg(&mut args, "units")?)?;
                let phonons: PhononUnit = parsed(arg(&mut args, "units")?)?;
                Command::Units(Units { energy, phonons })
            }
            "cols" => Command::Cols(numbers(args)?),
            "path" => Command::Path(arg(&mut args, "path")?.to_string()),
            "width" => Command::Width(parsed(arg(&mut args, "width")?)?),
            "restart" => Command::Restart,
            "terminate" => Command::Terminate,
            "reconnect" => Command::Reconnect,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(cmd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Help,
    Quit,
}

impl Command {
    pub fn apply<T, R, S>(self, ctl: &mut SessionController<T, R, S>) -> Result<Flow, SessionError>
    where
        T: Transport,
        R: ViewRenderer,
        S: SettingsStore,
    {
        match self {
            Command::Help => return Ok(Flow::Help),
            Command::Quit => return Ok(Flow::Quit),
            Command::Go(fragment) => ctl.navigate(&fragment),
            Command::FilterTags(tids) => ctl.filter_tags(&tids),
            Command::BrowseTags(tids) => ctl.browse_tags(&tids),
            Command::Open(hash) => ctl.open_object(&hash)?,
            Command::Close(hash) => ctl.close_object(&hash)?,
            Command::CloseAll => ctl.close_all_objects()?,
            Command::Pane(hash, pane) => ctl.open_pane(&hash, pane)?,
            Command::List(path) => ctl.list_dir(&path),
            Command::Scan(path) => ctl.scan_file(&path),
            Command::ScanDir { path, recursive } => ctl.scan_directory(&path, recursive),
            Command::SwitchDb(name) => ctl.switch_db(&name)?,
            Command::CreateDb(name) => ctl.create_db(&name)?,
            Command::DeleteDb(name) => ctl.delete_db(&name)?,
            Command::Select(hash) => ctl.toggle_selection(&hash),
            Command::Copy(dest) => ctl.copy_selected(&dest)?,
            Command::Delete => ctl.delete_selected()?,
            Command::Export => ctl.export_selected()?,
            Command::Units(units) => ctl.set_units(units),
            Command::Cols(cols) => ctl.save_columns(cols),
            Command::Path(dir) => ctl.set_local_path(&dir),
            Command::Width(px) => ctl.apply_viewport_width(px),
            Command::Restart => ctl.restart(),
            Command::Terminate => ctl.terminate(),
            Command::Reconnect => ctl.reconnect(),
        }
        Ok(Flow::Continue)
    }
}
