//! A [`FolderTransport`] that speaks IMAP over any `Read + Write` stream.
//!
//! The stream must already be past the greeting and authenticated. [`ImapTransport`] issues
//! tagged commands one at a time, reads until the matching tagged completion, and queues every
//! untagged response it did not ask for so the session can apply it.

use std::collections::VecDeque;
use std::io::{BufRead, Read, Write};

use bufstream::BufStream;
use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::error::{Error, ParseError, Result, ValidateError};
use crate::resync::ResyncHints;
use crate::store::{MessageRef, StoreAction, StoreCommand, StoreRequest, StoreResponse};
use crate::transport::{AppendMessage, AppendUid, CopyUid, FolderTransport, Notification, OpenResponse};
use crate::types::{FolderAccess, Keywords, MessageSummary, UniqueId};
use crate::utils::sequence_set;

pub(crate) mod parse;

use self::parse::{Completion, Untagged};

const TAG_PREFIX: &str = "a";
const INITIAL_TAG: u32 = 0;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

lazy_static! {
    static ref LITERAL: Regex = Regex::new(r"\{(\d+)\}\r\n$").unwrap();
}

macro_rules! quote {
    ($x:expr) => {
        format!("\"{}\"", $x.replace(r"\", r"\\").replace("\"", "\\\""))
    };
}

fn validate_str(synopsis: &str, argument: &str, value: &str) -> Result<String> {
    match value.chars().find(|&c| c == '\r' || c == '\n') {
        Some(offending_char) => Err(ValidateError {
            command_synopsis: synopsis.to_string(),
            argument: argument.to_string(),
            offending_char,
        }
        .into()),
        None => Ok(quote!(value)),
    }
}

/// Keywords go on the wire as bare atoms.
fn validate_atom<'a>(synopsis: &str, argument: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("empty {}", argument)));
    }
    match value
        .chars()
        .find(|&c| !c.is_ascii() || c.is_ascii_control() || " (){%*\"\\]".contains(c))
    {
        Some(offending_char) => Err(ValidateError {
            command_synopsis: synopsis.to_string(),
            argument: argument.to_string(),
            offending_char,
        }
        .into()),
        None => Ok(value),
    }
}

/// An IMAP connection driving one open folder at a time.
#[derive(Debug)]
pub struct ImapTransport<T: Read + Write> {
    stream: BufStream<T>,
    tag: u32,
    tag_prefix: String,
    condstore: bool,
    mod_seq: bool,
    uid_validity: u32,
    pending: VecDeque<Notification>,
}

impl<T: Read + Write> ImapTransport<T> {
    /// Wrap an authenticated stream.
    pub fn new(stream: T) -> ImapTransport<T> {
        ImapTransport {
            stream: BufStream::new(stream),
            tag: INITIAL_TAG,
            tag_prefix: TAG_PREFIX.to_string(),
            condstore: true,
            mod_seq: false,
            uid_validity: 0,
            pending: VecDeque::new(),
        }
    }

    /// Tag commands `<prefix>1`, `<prefix>2`, ... instead of `a1`, `a2`, ...
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Whether to ask for mod-sequences (`CONDSTORE`) when opening a folder without resync
    /// hints. On by default; turn it off for servers that do not advertise `CONDSTORE`.
    pub fn with_condstore(mut self, condstore: bool) -> Self {
        self.condstore = condstore;
        self
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> Result<T> {
        Ok(self.stream.into_inner()?)
    }

    fn run(&mut self, command: &str) -> Result<(Untagged, Completion)> {
        let command = self.create_command(command);
        self.write_line(command.as_bytes())?;
        let (data, done) = self.read_response(Vec::new())?;
        Ok((parse::parse_untagged(&data, self.uid_validity)?, done))
    }

    /// Run a command whose last argument is the literal `content`.
    fn run_with_literal(&mut self, command: &str, content: &[u8]) -> Result<(Untagged, Completion)> {
        let command = self.create_command(&format!("{} {{{}}}", command, content.len()));
        self.write_line(command.as_bytes())?;

        let mut data = Vec::new();
        loop {
            let start = data.len();
            self.read_logical_line(&mut data)?;
            let line = &data[start..];
            if line.starts_with(b"+") {
                data.truncate(start);
                break;
            }
            if self.is_tagged(line) {
                // an OK here means the server skipped the continuation
                parse::parse_tagged(line)?;
                return Err(Error::Parse(ParseError::Invalid(line.to_vec())));
            }
        }

        self.stream.write_all(content)?;
        self.stream.write_all(&[CR, LF])?;
        self.stream.flush()?;
        log::trace!("C: <{} bytes>", content.len());

        let (data, done) = self.read_response(data)?;
        Ok((parse::parse_untagged(&data, self.uid_validity)?, done))
    }

    /// Read until the tagged completion of the current command. Returns everything untagged
    /// appended to `data`.
    fn read_response(&mut self, mut data: Vec<u8>) -> Result<(Vec<u8>, Completion)> {
        loop {
            let start = data.len();
            self.read_logical_line(&mut data)?;
            if self.is_tagged(&data[start..]) {
                let done = parse::parse_tagged(&data[start..])?;
                data.truncate(start);
                return Ok((data, done));
            }
        }
    }

    fn is_tagged(&self, line: &[u8]) -> bool {
        let tag = format!("{}{} ", self.tag_prefix, self.tag);
        line.starts_with(tag.as_bytes())
    }

    /// Read one line plus any literals it announces.
    fn read_logical_line(&mut self, into: &mut Vec<u8>) -> Result<()> {
        loop {
            let start = into.len();
            self.readline(into)?;
            let size = match LITERAL.captures(&into[start..]) {
                Some(caps) => std::str::from_utf8(&caps[1])
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| Error::Parse(ParseError::Invalid(into[start..].to_vec())))?,
                None => return Ok(()),
            };
            let from = into.len();
            into.resize(from + size, 0);
            self.stream.read_exact(&mut into[from..])?;
        }
    }

    fn readline(&mut self, into: &mut Vec<u8>) -> Result<usize> {
        let read = self.stream.read_until(LF, into)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }
        let line = &into[into.len() - read..];
        log::trace!("S: {}", String::from_utf8_lossy(line).trim_end());
        Ok(read)
    }

    fn create_command(&mut self, command: &str) -> String {
        self.tag += 1;
        format!("{}{} {}", self.tag_prefix, self.tag, command)
    }

    fn write_line(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.stream.write_all(&[CR, LF])?;
        self.stream.flush()?;
        log::trace!("C: {}", String::from_utf8_lossy(buf));
        Ok(())
    }

    fn queue(&mut self, untagged: Untagged) {
        self.pending.extend(untagged.notifications);
    }
}

/// ` (\Seen kw) "17-Jul-1996 02:44:25 -0700"` for `APPEND` and `REPLACE`.
fn message_attributes(synopsis: &str, message: &AppendMessage<'_>) -> Result<String> {
    let mut attributes = String::new();
    let flags = message.message_flags().storable();
    if !flags.is_empty() || !message.message_keywords().is_empty() {
        for keyword in message.message_keywords() {
            validate_atom(synopsis, "keyword", keyword)?;
        }
        attributes.push(' ');
        attributes.push_str(&flags.flag_list(Some(message.message_keywords())));
    }
    if let Some(date) = message.date() {
        attributes.push(' ');
        attributes.push_str(&quote!(date.format("%d-%b-%Y %H:%M:%S %z").to_string()));
    }
    Ok(attributes)
}

/// `+FLAGS.SILENT (\Seen)` and friends.
fn store_item(request: &StoreRequest, kept_keywords: Option<&Keywords>) -> Result<String> {
    let sign = match request.action() {
        StoreAction::Add => "+",
        StoreAction::Remove => "-",
        StoreAction::Set => "",
    };
    let silent = if request.is_silent() { ".SILENT" } else { "" };

    if let Some(labels) = request.label_delta() {
        let labels = labels
            .iter()
            .map(|label| validate_str("STORE X-GM-LABELS", "label", label))
            .collect::<Result<Vec<_>>>()?;
        return Ok(format!("{}X-GM-LABELS{} ({})", sign, silent, labels.join(" ")));
    }

    let keywords = request.keyword_delta().or(kept_keywords);
    for keyword in keywords.into_iter().flatten() {
        validate_atom("STORE FLAGS", "keyword", keyword)?;
    }
    Ok(format!(
        "{}FLAGS{} {}",
        sign,
        silent,
        request.flag_delta().flag_list(keywords)
    ))
}

impl<T: Read + Write> FolderTransport for ImapTransport<T> {
    fn enable_quick_resync(&mut self) -> Result<()> {
        let (untagged, _) = self.run("ENABLE QRESYNC")?;
        self.queue(untagged);
        Ok(())
    }

    fn open(
        &mut self,
        mailbox: &str,
        access: FolderAccess,
        hints: Option<&ResyncHints>,
    ) -> Result<OpenResponse> {
        let verb = match access {
            FolderAccess::ReadWrite => "SELECT",
            FolderAccess::ReadOnly => "EXAMINE",
        };
        let mut command = format!(
            "{} {}",
            verb,
            validate_str(&format!("{} (mailbox)", verb), "mailbox", mailbox)?
        );
        match hints {
            Some(hints) if hints.last_known_mod_seq > 0 => {
                command.push_str(&format!(
                    " (QRESYNC ({} {}",
                    hints.uid_validity, hints.last_known_mod_seq
                ));
                let known = sequence_set(
                    hints
                        .known_uids
                        .iter()
                        .filter(|uid| uid.validity() == hints.uid_validity)
                        .map(|uid| uid.id()),
                );
                if !known.is_empty() {
                    command.push(' ');
                    command.push_str(&known);
                }
                command.push_str("))");
            }
            _ if self.condstore => command.push_str(" (CONDSTORE)"),
            _ => {}
        }

        // whatever was queued belongs to the previous folder
        self.pending.clear();
        self.uid_validity = hints.map_or(0, |h| h.uid_validity);

        let (untagged, done) = self.run(&command)?;
        let uid_validity = untagged.uid_validity.ok_or_else(|| {
            Error::Parse(ParseError::ResponseCode("missing UIDVALIDITY".to_string()))
        })?;
        let highest_mod_seq = if untagged.no_mod_seq {
            None
        } else {
            untagged.highest_mod_seq
        };
        self.uid_validity = uid_validity;
        self.mod_seq = self.condstore && highest_mod_seq.is_some();
        log::debug!(
            "opened {} ({:?}): UIDVALIDITY {}, HIGHESTMODSEQ {:?}",
            mailbox,
            access,
            uid_validity,
            highest_mod_seq
        );

        Ok(OpenResponse {
            uid_validity,
            uid_next: untagged.uid_next,
            highest_mod_seq,
            exists: untagged.exists.unwrap_or(0),
            access: done.access().or(untagged.access).unwrap_or(access),
            notifications: untagged.notifications,
        })
    }

    fn store(&mut self, command: &StoreCommand) -> Result<StoreResponse> {
        let request = command.request();
        let verb = if command.by_uid() { "UID STORE" } else { "STORE" };
        let condition = request
            .precondition()
            .map(|mod_seq| format!(" (UNCHANGEDSINCE {})", mod_seq))
            .unwrap_or_default();
        let batches = command
            .batches()
            .into_iter()
            .map(|batch| -> Result<(String, Vec<MessageRef>)> {
                let line = format!(
                    "{} {}{} {}",
                    verb,
                    batch.sequence_set(),
                    condition,
                    store_item(request, batch.kept_keywords)?
                );
                Ok((line, batch.targets))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut response = StoreResponse::default();
        for (line, targets) in batches {
            let (mut untagged, done) = self.run(&line)?;
            response.fetched.extend(untagged.take_fetches());
            self.queue(untagged);

            let refused = done.modified()?;
            response
                .modified
                .extend(targets.into_iter().filter(|target| match *target {
                    MessageRef::Uid(uid) => refused.contains(uid.id()),
                    MessageRef::Index(index) => refused.contains(index + 1),
                }));
        }
        Ok(response)
    }

    fn fetch(&mut self) -> Result<Vec<MessageSummary>> {
        let line = if self.mod_seq {
            "UID FETCH 1:* (UID FLAGS MODSEQ)"
        } else {
            "UID FETCH 1:* (UID FLAGS)"
        };
        let (mut untagged, _) = self.run(line)?;
        let fetched = untagged.take_fetches();
        self.queue(untagged);
        Ok(fetched)
    }

    fn copy(
        &mut self,
        uids: &[UniqueId],
        destination: &str,
        remove_source: bool,
    ) -> Result<Option<CopyUid>> {
        if uids.is_empty() {
            return Ok(None);
        }
        let verb = if remove_source { "UID MOVE" } else { "UID COPY" };
        let line = format!(
            "{} {} {}",
            verb,
            sequence_set(uids.iter().map(|uid| uid.id())),
            validate_str(&format!("{} (set) (mailbox)", verb), "mailbox", destination)?
        );
        let (mut untagged, done) = self.run(&line)?;
        let copied = match done.copy_uid()? {
            Some(copied) => Some(copied),
            None => untagged.copy_uid.take(),
        };
        let copied = copied.map(|code| code.expand(uids.len())).transpose()?;
        self.queue(untagged);
        Ok(copied)
    }

    fn append(&mut self, mailbox: &str, message: &AppendMessage<'_>) -> Result<Option<AppendUid>> {
        let synopsis = "APPEND (mailbox) (flags) (date) (message)";
        let line = format!(
            "APPEND {}{}",
            validate_str(synopsis, "mailbox", mailbox)?,
            message_attributes(synopsis, message)?
        );
        let (mut untagged, done) = self.run_with_literal(&line, message.content())?;
        let appended = match done.append_uid()? {
            Some(appended) => Some(appended),
            None => untagged.append_uid.take(),
        };
        let appended = appended.map(|code| code.expand(1)).transpose()?;
        self.queue(untagged);
        Ok(appended)
    }

    fn replace(
        &mut self,
        uid: UniqueId,
        mailbox: &str,
        message: &AppendMessage<'_>,
    ) -> Result<Option<AppendUid>> {
        let synopsis = "UID REPLACE (uid) (mailbox) (flags) (date) (message)";
        let line = format!(
            "UID REPLACE {} {}{}",
            uid.id(),
            validate_str(synopsis, "mailbox", mailbox)?,
            message_attributes(synopsis, message)?
        );
        let (mut untagged, done) = self.run_with_literal(&line, message.content())?;
        let appended = match done.append_uid()? {
            Some(appended) => Some(appended),
            None => untagged.append_uid.take(),
        };
        let appended = appended.map(|code| code.expand(1)).transpose()?;
        self.queue(untagged);
        Ok(appended)
    }

    fn noop(&mut self) -> Result<()> {
        let (untagged, _) = self.run("NOOP")?;
        self.queue(untagged);
        Ok(())
    }

    fn drain_notifications(&mut self) -> Result<Vec<Notification>> {
        Ok(self.pending.drain(..).collect())
    }
}
