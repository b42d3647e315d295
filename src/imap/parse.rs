use std::ops::RangeInclusive;

use imap_proto::types::{AttributeValue, MailboxDatum, Response, ResponseCode, UidSetMember};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, ParseError, Result};
use crate::transport::{AppendUid, CopyUid, Notification};
use crate::types::{
    Flag, FolderAccess, MessageFlags, MessageSummary, ModSeq, Uid, UniqueId, VanishedSet,
};

lazy_static! {
    static ref TAGGED: Regex =
        Regex::new(r"^(\S+) (OK|NO|BAD)(?: \[([^\]]*)\])?(?: (.*?))?\s*$").unwrap();
    static ref COPYUID: Regex = Regex::new(r"^COPYUID (\d+) (\S+) (\S+)$").unwrap();
    static ref APPENDUID: Regex = Regex::new(r"^APPENDUID (\d+) (\S+)$").unwrap();
    static ref MODIFIED: Regex = Regex::new(r"^MODIFIED (\S+)$").unwrap();
}

const NOMODSEQ: &[u8] = b"* OK [NOMODSEQ]";

/// Everything of interest in the untagged part of a response.
#[derive(Debug, Default)]
pub(crate) struct Untagged {
    pub(crate) notifications: Vec<Notification>,
    pub(crate) uid_validity: Option<u32>,
    pub(crate) uid_next: Option<Uid>,
    pub(crate) highest_mod_seq: Option<ModSeq>,
    pub(crate) no_mod_seq: bool,
    pub(crate) exists: Option<u32>,
    pub(crate) access: Option<FolderAccess>,
    pub(crate) copy_uid: Option<CopyUidCode>,
    pub(crate) append_uid: Option<AppendUidCode>,
}

/// A uid set taken from a response code, kept as ranges until checked against what the
/// command could legitimately have produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct UidRanges(Vec<RangeInclusive<Uid>>);

impl UidRanges {
    fn from_members(members: &[UidSetMember]) -> Self {
        UidRanges(
            members
                .iter()
                .map(|m| match m {
                    UidSetMember::UidRange(range) => {
                        (*range.start()).min(*range.end())..=(*range.start()).max(*range.end())
                    }
                    UidSetMember::Uid(uid) => *uid..=*uid,
                })
                .collect(),
        )
    }

    pub(crate) fn len(&self) -> u64 {
        self.0
            .iter()
            .map(|r| u64::from(*r.end() - *r.start()) + 1)
            .sum()
    }

    pub(crate) fn contains(&self, id: Uid) -> bool {
        self.0.iter().any(|r| r.contains(&id))
    }

    /// List every uid, in the order given, unless there are more than `limit`.
    pub(crate) fn expand(&self, limit: usize) -> Result<Vec<Uid>> {
        if self.len() > limit as u64 {
            return Err(Error::Parse(ParseError::ResponseCode(format!(
                "uid set of {} uids where at most {} were expected",
                self.len(),
                limit
            ))));
        }
        Ok(self.0.iter().flat_map(|r| r.clone()).collect())
    }
}

/// `COPYUID`, not yet expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CopyUidCode {
    pub(crate) uid_validity: u32,
    pub(crate) source: UidRanges,
    pub(crate) destination: UidRanges,
}

impl CopyUidCode {
    /// Expand for a command that sent `sent` uids.
    pub(crate) fn expand(&self, sent: usize) -> Result<CopyUid> {
        Ok(CopyUid {
            uid_validity: self.uid_validity,
            source: self.source.expand(sent)?,
            destination: self.destination.expand(sent)?,
        })
    }
}

/// `APPENDUID`, not yet expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AppendUidCode {
    pub(crate) uid_validity: u32,
    pub(crate) uids: UidRanges,
}

impl AppendUidCode {
    /// Expand for a command that added `sent` messages.
    pub(crate) fn expand(&self, sent: usize) -> Result<AppendUid> {
        Ok(AppendUid {
            uid_validity: self.uid_validity,
            uids: self.uids.expand(sent)?,
        })
    }
}

impl Untagged {
    /// Split off the `FETCH` responses.
    pub(crate) fn take_fetches(&mut self) -> Vec<MessageSummary> {
        let (fetches, rest) = std::mem::take(&mut self.notifications)
            .into_iter()
            .partition::<Vec<_>, _>(|n| matches!(n, Notification::Fetch(_)));
        self.notifications = rest;
        fetches
            .into_iter()
            .filter_map(|n| match n {
                Notification::Fetch(summary) => Some(summary),
                _ => None,
            })
            .collect()
    }
}

/// Decode untagged responses for a folder of `UIDVALIDITY` `uid_validity`.
///
/// A `UIDVALIDITY` code among the lines overrides `uid_validity` for every later line. Lines
/// `imap-proto` cannot make sense of are skipped, but a response cut off mid-way is an error.
pub(crate) fn parse_untagged(mut lines: &[u8], uid_validity: u32) -> Result<Untagged> {
    let mut untagged = Untagged::default();
    let mut validity = uid_validity;

    while !lines.is_empty() {
        if lines.starts_with(NOMODSEQ) {
            untagged.no_mod_seq = true;
            lines = skip_line(lines);
            continue;
        }

        match imap_proto::parser::parse_response(lines) {
            Ok((rest, response)) => {
                lines = rest;
                match response {
                    Response::Data { code: Some(code), .. } => {
                        handle_code(code, &mut untagged, &mut validity);
                    }
                    Response::MailboxData(MailboxDatum::Exists(n)) => {
                        untagged.exists = Some(n);
                        untagged.notifications.push(Notification::Exists(n));
                    }
                    Response::Fetch(seq, attributes) => {
                        if let Some(summary) = summarize(seq, &attributes, validity) {
                            untagged.notifications.push(Notification::Fetch(summary));
                        }
                    }
                    Response::Expunge(seq) if seq > 0 => {
                        untagged.notifications.push(Notification::Expunge(seq - 1));
                    }
                    Response::Vanished { earlier, uids } => {
                        untagged
                            .notifications
                            .push(Notification::Vanished(VanishedSet::from_ranges(
                                validity, &uids, earlier,
                            )));
                    }
                    _ => {}
                }
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(Error::Parse(ParseError::Invalid(lines.to_vec())));
            }
            Err(_) => {
                log::debug!(
                    "skipping unparsed response: {}",
                    String::from_utf8_lossy(line_of(lines)).trim_end()
                );
                lines = skip_line(lines);
            }
        }
    }

    if untagged.uid_validity.is_none() && validity != uid_validity {
        untagged.uid_validity = Some(validity);
    }
    Ok(untagged)
}

fn line_of(lines: &[u8]) -> &[u8] {
    match lines.iter().position(|&b| b == b'\n') {
        Some(end) => &lines[..=end],
        None => lines,
    }
}

fn skip_line(lines: &[u8]) -> &[u8] {
    &lines[line_of(lines).len()..]
}

fn handle_code(code: ResponseCode<'_>, untagged: &mut Untagged, validity: &mut u32) {
    match code {
        ResponseCode::HighestModSeq(m) => {
            untagged.highest_mod_seq = Some(m);
            untagged.notifications.push(Notification::HighestModSeq(m));
        }
        ResponseCode::UidValidity(v) => {
            untagged.uid_validity = Some(v);
            *validity = v;
        }
        ResponseCode::UidNext(n) => untagged.uid_next = Some(n),
        ResponseCode::ReadOnly => untagged.access = Some(FolderAccess::ReadOnly),
        ResponseCode::ReadWrite => untagged.access = Some(FolderAccess::ReadWrite),
        ResponseCode::CopyUid(v, source, destination) => {
            untagged.copy_uid = Some(CopyUidCode {
                uid_validity: v,
                source: UidRanges::from_members(&source),
                destination: UidRanges::from_members(&destination),
            });
        }
        ResponseCode::AppendUid(v, uids) => {
            untagged.append_uid = Some(AppendUidCode {
                uid_validity: v,
                uids: UidRanges::from_members(&uids),
            });
        }
        _ => {}
    }
}

fn summarize(seq: u32, attributes: &[AttributeValue<'_>], validity: u32) -> Option<MessageSummary> {
    if seq == 0 {
        log::warn!("FETCH with message sequence number 0");
        return None;
    }
    let mut summary = MessageSummary::new(seq - 1);
    for attribute in attributes {
        match attribute {
            AttributeValue::Uid(uid) => summary.uid = Some(UniqueId::new(validity, *uid)),
            AttributeValue::Flags(flags) => {
                let (flags, keywords) = MessageFlags::split(flags.iter().map(|f| Flag::from(&**f)));
                summary.flags = Some(flags);
                summary.keywords = Some(keywords);
            }
            AttributeValue::ModSeq(m) => summary.mod_seq = Some(*m),
            _ => {}
        }
    }
    Some(summary)
}

/// The tagged completion of a command.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Completion {
    pub(crate) tag: String,
    pub(crate) code: Option<String>,
}

/// Parse a tagged status line, turning `NO` and `BAD` into errors.
pub(crate) fn parse_tagged(line: &[u8]) -> Result<Completion> {
    let text = std::str::from_utf8(line)
        .map_err(|e| Error::Parse(ParseError::DataNotUtf8(line.to_vec(), e)))?;
    let caps = TAGGED
        .captures(text)
        .ok_or_else(|| Error::Parse(ParseError::Invalid(line.to_vec())))?;
    let information = caps
        .get(4)
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "no explanation given".to_string());
    match &caps[2] {
        "OK" => Ok(Completion {
            tag: caps[1].to_string(),
            code: caps.get(3).map(|m| m.as_str().to_string()),
        }),
        "NO" => Err(Error::No(information)),
        _ => Err(Error::Bad(information)),
    }
}

/// Parse an IMAP sequence set such as `1:3,7,9:8` into ranges. `*` is not allowed.
pub(crate) fn parse_sequence_set(set: &str) -> Result<Vec<RangeInclusive<u32>>> {
    let invalid = || Error::Parse(ParseError::ResponseCode(set.to_string()));
    set.split(',')
        .map(|part| {
            let mut bounds = part.splitn(2, ':');
            let a: u32 = bounds.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
            let b: u32 = match bounds.next() {
                Some(b) => b.parse().map_err(|_| invalid())?,
                None => a,
            };
            Ok(a.min(b)..=a.max(b))
        })
        .collect()
}

fn ranges(set: &str) -> Result<UidRanges> {
    parse_sequence_set(set).map(UidRanges)
}

impl Completion {
    /// `[MODIFIED set]`
    pub(crate) fn modified(&self) -> Result<UidRanges> {
        match self.code.as_deref().and_then(|c| MODIFIED.captures(c)) {
            Some(caps) => ranges(&caps[1]),
            None => Ok(UidRanges::default()),
        }
    }

    /// `[COPYUID validity source destination]`
    pub(crate) fn copy_uid(&self) -> Result<Option<CopyUidCode>> {
        match self.code.as_deref().and_then(|c| COPYUID.captures(c)) {
            Some(caps) => Ok(Some(CopyUidCode {
                uid_validity: caps[1]
                    .parse()
                    .map_err(|_| Error::Parse(ParseError::ResponseCode(caps[0].to_string())))?,
                source: ranges(&caps[2])?,
                destination: ranges(&caps[3])?,
            })),
            None => Ok(None),
        }
    }

    /// `[APPENDUID validity uids]`
    pub(crate) fn append_uid(&self) -> Result<Option<AppendUidCode>> {
        match self.code.as_deref().and_then(|c| APPENDUID.captures(c)) {
            Some(caps) => Ok(Some(AppendUidCode {
                uid_validity: caps[1]
                    .parse()
                    .map_err(|_| Error::Parse(ParseError::ResponseCode(caps[0].to_string())))?,
                uids: ranges(&caps[2])?,
            })),
            None => Ok(None),
        }
    }

    /// `[READ-ONLY]` or `[READ-WRITE]`
    pub(crate) fn access(&self) -> Option<FolderAccess> {
        match self.code.as_deref() {
            Some("READ-ONLY") => Some(FolderAccess::ReadOnly),
            Some("READ-WRITE") => Some(FolderAccess::ReadWrite),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fetches_test() {
        let lines = b"\
                    * 24 FETCH (FLAGS (\\Seen $Junk) UID 4827943 MODSEQ (65402))\r\n\
                    * 25 FETCH (FLAGS (\\Seen))\r\n";
        let mut untagged = parse_untagged(lines, 7).unwrap();
        let fetches = untagged.take_fetches();
        assert!(untagged.notifications.is_empty());
        assert_eq!(fetches.len(), 2);
        assert_eq!(fetches[0].index, 23);
        assert_eq!(fetches[0].uid, Some(UniqueId::new(7, 4827943)));
        assert_eq!(fetches[0].flags, Some(MessageFlags::SEEN));
        assert!(fetches[0].keywords.as_ref().unwrap().contains("$Junk"));
        assert_eq!(fetches[0].mod_seq, Some(65402));
        assert_eq!(fetches[1].index, 24);
        assert_eq!(fetches[1].uid, None);
        assert_eq!(fetches[1].mod_seq, None);
    }

    #[test]
    fn parse_select_qresync() {
        let lines = b"\
            * 3 EXISTS\r\n\
            * OK [UIDVALIDITY 67890007] UIDs valid\r\n\
            * OK [UIDNEXT 550] Predicted next UID\r\n\
            * OK [HIGHESTMODSEQ 90060128194045007] Highest mailbox mod-sequence\r\n\
            * VANISHED (EARLIER) 41,43:116,118,120:211,214:540\r\n\
            * 1 FETCH (UID 49 MODSEQ (90060115194045000) FLAGS (\\Seen))\r\n";
        let untagged = parse_untagged(lines, 0).unwrap();
        assert_eq!(untagged.uid_validity, Some(67890007));
        assert_eq!(untagged.uid_next, Some(550));
        assert_eq!(untagged.highest_mod_seq, Some(90060128194045007));
        assert_eq!(untagged.exists, Some(3));
        assert!(!untagged.no_mod_seq);

        let vanished = untagged
            .notifications
            .iter()
            .find_map(|n| match n {
                Notification::Vanished(v) => Some(v),
                _ => None,
            })
            .unwrap();
        assert!(vanished.earlier);
        assert!(vanished.contains(UniqueId::new(67890007, 41)));
        assert!(!vanished.contains(UniqueId::new(67890007, 42)));

        let fetch = untagged
            .notifications
            .iter()
            .find_map(|n| match n {
                Notification::Fetch(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(fetch.uid, Some(UniqueId::new(67890007, 49)));
    }

    #[test]
    fn parse_unilateral() {
        let lines = b"\
            * 4 EXPUNGE\r\n\
            * VANISHED 405,407\r\n\
            * 12 EXISTS\r\n";
        let untagged = parse_untagged(lines, 1).unwrap();
        assert_eq!(
            untagged.notifications,
            vec![
                Notification::Expunge(3),
                Notification::Vanished(VanishedSet::from_ranges(1, &[405..=405, 407..=407], false)),
                Notification::Exists(12),
            ]
        );
    }

    #[test]
    fn nomodseq_is_noticed() {
        let lines = b"\
            * OK [NOMODSEQ] Sorry, this mailbox format doesn't support modsequences\r\n\
            * 2 EXISTS\r\n";
        let untagged = parse_untagged(lines, 1).unwrap();
        assert!(untagged.no_mod_seq);
        assert_eq!(untagged.exists, Some(2));
    }

    #[test]
    fn truncated_response() {
        assert!(matches!(
            parse_untagged(b"* 1 FETCH (UID 5 FLAGS (\\Seen", 1),
            Err(Error::Parse(ParseError::Invalid(_)))
        ));
    }

    #[test]
    fn tagged_lines() {
        let done = parse_tagged(b"a3 OK [MODIFIED 7,9:10] Conditional STORE failed\r\n").unwrap();
        assert_eq!(done.tag, "a3");
        let modified = done.modified().unwrap();
        assert_eq!(modified.len(), 3);
        assert!(modified.contains(9) && !modified.contains(8));

        let done = parse_tagged(b"a4 OK [COPYUID 38 10:12,14 200:203] Done\r\n").unwrap();
        assert_eq!(
            done.copy_uid().unwrap().unwrap().expand(4).unwrap(),
            CopyUid {
                uid_validity: 38,
                source: vec![10, 11, 12, 14],
                destination: vec![200, 201, 202, 203],
            }
        );

        let done = parse_tagged(b"a5 OK [APPENDUID 38 101] APPEND completed\r\n").unwrap();
        assert_eq!(done.append_uid().unwrap().unwrap().expand(1).unwrap().uids, vec![101]);

        let done = parse_tagged(b"a6 OK [READ-ONLY] EXAMINE completed\r\n").unwrap();
        assert_eq!(done.access(), Some(FolderAccess::ReadOnly));

        let done = parse_tagged(b"a7 OK NOOP completed\r\n").unwrap();
        assert_eq!(done.code, None);
        assert_eq!(done.modified().unwrap().len(), 0);

        match parse_tagged(b"a8 NO [TRYCREATE] No such mailbox\r\n") {
            Err(Error::No(text)) => assert_eq!(text, "No such mailbox"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_tagged(b"a9 BAD\r\n"), Err(Error::Bad(_))));
        assert!(matches!(
            parse_tagged(b"garbage\r\n"),
            Err(Error::Parse(ParseError::Invalid(_)))
        ));
    }

    #[test]
    fn huge_uid_sets_are_not_expanded() {
        let done = parse_tagged(b"a1 OK [MODIFIED 1:4000000000] Conditional STORE failed\r\n")
            .unwrap();
        let modified = done.modified().unwrap();
        assert_eq!(modified.len(), 4_000_000_000);
        assert!(modified.contains(3_999_999_999));

        let done = parse_tagged(b"a2 OK [COPYUID 38 1:4000000000 1:4000000000] Done\r\n").unwrap();
        assert!(matches!(
            done.copy_uid().unwrap().unwrap().expand(2),
            Err(Error::Parse(ParseError::ResponseCode(_)))
        ));

        let untagged =
            parse_untagged(b"* OK [APPENDUID 38 1:4000000000] Appended\r\n", 1).unwrap();
        assert!(untagged.append_uid.unwrap().expand(1).is_err());

        let untagged = parse_untagged(b"* VANISHED 1:4000000000\r\n", 1).unwrap();
        match untagged.notifications.as_slice() {
            [Notification::Vanished(set)] => assert_eq!(set.ranges(), &[1..=4_000_000_000]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sequence_sets() {
        assert_eq!(parse_sequence_set("1:3,7,9:8").unwrap(), vec![1..=3, 7..=7, 8..=9]);
        assert!(parse_sequence_set("1:*").is_err());
        assert!(parse_sequence_set("").is_err());
    }
}
