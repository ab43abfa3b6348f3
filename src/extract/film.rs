//! Film detail page extraction

use crate::crawler::trailing_id;
use crate::extract::{ParseFailure, RecordBuilder};
use crate::state::ItemId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// A production country
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub id: i64,
    pub name: String,
}

/// A person credited on a film
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub person_id: i64,
    pub name: String,
    pub role: &'static str,
}

/// Everything kept about a film
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmRecord {
    pub id: ItemId,
    pub title: String,
    pub alternative_title: Option<String>,
    pub year: Option<i32>,
    pub slogan: Option<String>,
    pub length_minutes: Option<u32>,
    pub countries: Vec<Country>,
    pub credits: Vec<Credit>,
}

/// Info-table labels that list people, with the role they are stored under
const ROLES: [(&str, &str); 7] = [
    ("режиссер", "director"),
    ("сценарий", "writer"),
    ("продюсер", "producer"),
    ("оператор", "operator"),
    ("композитор", "composer"),
    ("художник", "design"),
    ("монтаж", "editor"),
];

/// Parses the catalog's film pages
#[derive(Debug, Default, Clone, Copy)]
pub struct FilmBuilder;

impl RecordBuilder for FilmBuilder {
    type Record = FilmRecord;

    fn build_record(&self, id: ItemId, body: &str) -> Result<FilmRecord, ParseFailure> {
        let document = Html::parse_document(body);

        let title = select_first(&document, "h1.moviename-big")
            .map(text_of)
            .filter(|title| !title.is_empty())
            .ok_or(ParseFailure::MissingField { id, what: "title" })?;

        let alternative_title = select_first(&document, "span[itemprop=\"alternativeHeadline\"]")
            .map(text_of)
            .filter(|alt| !alt.is_empty());

        let mut film = FilmRecord {
            id,
            title,
            alternative_title,
            year: None,
            slogan: None,
            length_minutes: None,
            countries: Vec::new(),
            credits: Vec::new(),
        };
        parse_info_table(&document, &mut film)?;

        Ok(film)
    }
}

/// Walks `table.info` rows, dispatching on the `td.type` label
///
/// A year or running time row that holds text but no number is malformed;
/// empty and `-` cells simply leave the field unset.
fn parse_info_table(document: &Html, film: &mut FilmRecord) -> Result<(), ParseFailure> {
    let (Ok(rows), Ok(label_cell), Ok(cell)) = (
        Selector::parse("table.info tr"),
        Selector::parse("td.type"),
        Selector::parse("td"),
    ) else {
        return Ok(());
    };

    for row in document.select(&rows) {
        let Some(label) = row.select(&label_cell).next().map(text_of) else {
            continue;
        };
        let Some(value) = row.select(&cell).nth(1) else {
            continue;
        };

        match label.as_str() {
            "страна" => film.countries.extend(parse_countries(value)),
            "слоган" => {
                film.slogan = Some(text_of(value)).filter(|s| !s.is_empty() && s.as_str() != "-");
            }
            "время" => {
                film.length_minutes = numeric_field(film.id, "length", value, parse_length)?;
            }
            "год" => film.year = numeric_field(film.id, "year", value, parse_year)?,
            other => match role_for(other) {
                Some(role) => film.credits.extend(parse_people(value, role)),
                None => tracing::trace!("Ignoring info row '{}'", other),
            },
        }
    }
    Ok(())
}

fn numeric_field<T>(
    id: ItemId,
    what: &'static str,
    cell: ElementRef<'_>,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, ParseFailure> {
    let text = text_of(cell);
    if text.is_empty() || text == "-" {
        return Ok(None);
    }
    match parse(&text) {
        Some(value) => Ok(Some(value)),
        None => Err(ParseFailure::Malformed {
            id,
            what,
            detail: text,
        }),
    }
}

fn role_for(label: &str) -> Option<&'static str> {
    ROLES
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, role)| *role)
}

fn parse_countries(cell: ElementRef<'_>) -> Vec<Country> {
    links(cell)
        .filter_map(|(href, name)| {
            trailing_id(href).map(|id| Country {
                id: id.get(),
                name,
            })
        })
        .collect()
}

fn parse_people(cell: ElementRef<'_>, role: &'static str) -> Vec<Credit> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"/name/(\d+)/?$").expect("valid person pattern"));

    links(cell)
        .filter_map(|(href, name)| {
            let person_id = pattern.captures(href)?[1].parse().ok()?;
            Some(Credit {
                person_id,
                name,
                role,
            })
        })
        .collect()
}

fn parse_length(text: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"(\d+)\s*мин").expect("valid length pattern"));
    pattern.captures(text)?[1].parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"(\d{4})").expect("valid year pattern"));
    pattern.captures(text)?[1].parse().ok()
}

/// `(href, text)` of every link in `cell`
fn links<'a>(cell: ElementRef<'a>) -> std::vec::IntoIter<(&'a str, String)> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new().into_iter();
    };
    cell.select(&selector)
        .filter_map(|a| a.value().attr("href").map(|href| (href, text_of(a))))
        .collect::<Vec<_>>()
        .into_iter()
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

/// Element text with whitespace (including non-breaking spaces) collapsed
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split(|c: char| c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
