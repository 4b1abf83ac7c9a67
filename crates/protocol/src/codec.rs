//! Request encoding and response decoding for the staging API.

use chrono::{DateTime, FixedOffset};

use crate::error::ParseError;
use crate::types::{NexusError, StagingRepository};
use crate::xml::{self, Element, XmlWriter};

/// Decodes a `stagingRepositories/data/stagingProfileRepository*` listing.
pub fn parse_repositories(
    source: &str,
    bytes: &[u8],
) -> Result<Vec<StagingRepository>, ParseError> {
    let root = xml::read_document(source, bytes)?;
    check_is_element(source, &root, "stagingRepositories")?;
    let data = require_child(source, &root, "data")?;

    data.descendants_named("stagingProfileRepository")
        .into_iter()
        .map(|element| repository_from_element(source, element))
        .collect()
}

/// Decodes a single repository document.
///
/// The root element's name is not checked; it is expected to be shaped
/// like a `stagingProfileRepository`.
pub fn parse_repository(source: &str, bytes: &[u8]) -> Result<StagingRepository, ParseError> {
    let root = xml::read_document(source, bytes)?;
    repository_from_element(source, &root)
}

/// Decodes the id from a `promoteResponse/data/stagedRepositoryId` document.
pub fn parse_created_repository_id(source: &str, bytes: &[u8]) -> Result<String, ParseError> {
    let root = xml::read_document(source, bytes)?;
    check_is_element(source, &root, "promoteResponse")?;
    let data = require_child(source, &root, "data")?;
    let id = require_child(source, data, "stagedRepositoryId")?;
    Ok(id.text().trim().to_string())
}

/// Decodes `*/errors/error*` if `content_type` says the body is XML.
///
/// Any other content type yields an empty list without looking at the body.
pub fn parse_errors_if_present(
    content_type: &str,
    source: &str,
    bytes: &[u8],
) -> Result<Vec<NexusError>, ParseError> {
    if !content_type.starts_with("application/xml") {
        return Ok(Vec::new());
    }

    let root = xml::read_document(source, bytes)?;
    let errors = require_child(source, &root, "errors")?;
    errors
        .descendants_named("error")
        .into_iter()
        .map(|element| {
            Ok(NexusError {
                id: required_text(source, element, "id")?,
                message: required_text(source, element, "msg")?,
            })
        })
        .collect()
}

/// Encodes a repository creation request.
pub fn encode_create_request(description: &str) -> Vec<u8> {
    let mut w = XmlWriter::new();
    w.start_element("promoteRequest")
        .start_element("data")
        .text_element("description", description)
        .end_element()
        .end_element();
    w.finish()
}

/// Encodes a bulk drop/close request for the given repositories.
pub fn encode_bulk_request<S: AsRef<str>>(ids: &[S]) -> Vec<u8> {
    bulk_request(ids, false)
}

/// Encodes a bulk promote request. Released repositories are always
/// dropped automatically afterwards.
pub fn encode_release_request<S: AsRef<str>>(ids: &[S]) -> Vec<u8> {
    bulk_request(ids, true)
}

fn bulk_request<S: AsRef<str>>(ids: &[S], auto_drop: bool) -> Vec<u8> {
    let mut w = XmlWriter::new();
    w.start_element("stagingActionRequest")
        .start_element("data")
        .start_element("stagedRepositoryIds");
    for id in ids {
        w.text_element("string", id.as_ref());
    }
    w.end_element();
    if auto_drop {
        w.text_element("autoDropAfterRelease", "true");
    }
    w.end_element().end_element();
    w.finish()
}

fn check_is_element(source: &str, element: &Element, expected: &str) -> Result<(), ParseError> {
    if element.name() != expected {
        return Err(ParseError::new(
            format!(
                "Expected an element '{expected}' but received '{}'",
                element.name()
            ),
            element.position(),
            source,
        ));
    }
    Ok(())
}

/// Finds the first descendant named `child`, reporting the parent's
/// position if there is none.
fn require_child<'a>(
    source: &str,
    element: &'a Element,
    child: &str,
) -> Result<&'a Element, ParseError> {
    element.first_descendant_named(child).ok_or_else(|| {
        ParseError::new(
            format!(
                "Expected an element '{child}' as a child of '{}'",
                element.name()
            ),
            element.position(),
            source,
        )
    })
}

fn required_text(source: &str, element: &Element, child: &str) -> Result<String, ParseError> {
    Ok(require_child(source, element, child)?.text().trim().to_string())
}

fn required_timestamp(
    source: &str,
    element: &Element,
    child: &str,
) -> Result<DateTime<FixedOffset>, ParseError> {
    let field = require_child(source, element, child)?;
    let text = field.text();
    parse_timestamp(text.trim()).ok_or_else(|| {
        ParseError::new(
            format!("Could not parse '{}' as a date-time in '{child}'", text.trim()),
            field.position(),
            source,
        )
    })
}

/// Accepts RFC 3339, a compact `+hhmm` offset, and an optional trailing
/// `[Region/City]` zone id.
fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = match text.find('[') {
        Some(index) if text.ends_with(']') => &text[..index],
        _ => text,
    };
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

fn repository_from_element(
    source: &str,
    element: &Element,
) -> Result<StagingRepository, ParseError> {
    let text = |child: &str| required_text(source, element, child);

    Ok(StagingRepository {
        created: required_timestamp(source, element, "created")?,
        description: text("description")?,
        ip_address: text("ipAddress")?,
        notifications: text("notifications")?,
        policy: text("policy")?,
        profile_id: text("profileId")?,
        profile_name: text("profileName")?,
        profile_type: text("profileType")?,
        provider: text("provider")?,
        repository_id: text("repositoryId")?,
        release_repository_id: text("releaseRepositoryId")?,
        release_repository_name: text("releaseRepositoryName")?,
        transitioning: text("transitioning")?.eq_ignore_ascii_case("true"),
        repository_type: text("type")?,
        user_id: text("userId")?,
        user_agent: text("userAgent")?,
        repository_uri: text("repositoryURI")?,
        updated: required_timestamp(source, element, "updated")?,
    })
}
