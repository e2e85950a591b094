use anyhow::anyhow;
use tracing::trace;

use crate::item::{
  ItemKind,
  ScheduledItem
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
  IdPrefix(String),
  Recipient(String),
  CreatedBy(String),
  Kind(ItemKind),
  Location(String),
  Dateless,
  TextContains(String)
}

/// Conjunction of predicates; the empty
/// filter matches everything.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct Filter {
  preds: Vec<Pred>
}

impl Filter {
  #[tracing::instrument(skip(terms))]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut preds = Vec::new();
    for term in terms {
      let term = term.trim();
      if term.is_empty() {
        continue;
      }
      preds.push(parse_term(term)?);
    }
    trace!(?preds, "parsed filter");
    Ok(Self {
      preds
    })
  }

  #[must_use]
  pub fn recipient(who: &str) -> Self {
    Self {
      preds: vec![Pred::Recipient(
        who.trim().to_ascii_lowercase()
      )]
    }
  }

  #[must_use]
  pub fn and(
    mut self,
    other: Filter
  ) -> Self {
    self.preds.extend(other.preds);
    self
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.preds.is_empty()
  }

  #[must_use]
  pub fn matches(
    &self,
    item: &ScheduledItem
  ) -> bool {
    self
      .preds
      .iter()
      .all(|pred| eval_pred(pred, item))
  }
}

fn parse_term(
  term: &str
) -> anyhow::Result<Pred> {
  if term.eq_ignore_ascii_case("dateless")
  {
    return Ok(Pred::Dateless);
  }

  if let Some((key, value)) =
    term.split_once(':')
  {
    let value = value.trim();
    if value.is_empty() {
      return Err(anyhow!(
        "filter term {term:?} has an \
         empty value"
      ));
    }
    let lower = value.to_ascii_lowercase();
    let pred =
      match key.to_ascii_lowercase().as_str()
      {
        | "id" => Pred::IdPrefix(lower),
        | "to" | "recipient" => {
          Pred::Recipient(lower)
        }
        | "by" | "creator" => {
          Pred::CreatedBy(lower)
        }
        | "kind" => {
          Pred::Kind(value.parse()?)
        }
        | "at" | "location" => {
          Pred::Location(lower)
        }
        | _ => Pred::TextContains(
          term.to_ascii_lowercase()
        )
      };
    return Ok(pred);
  }

  Ok(Pred::TextContains(
    term.to_ascii_lowercase()
  ))
}

fn eval_pred(
  pred: &Pred,
  item: &ScheduledItem
) -> bool {
  match pred {
    | Pred::IdPrefix(prefix) => {
      item
        .id
        .simple()
        .to_string()
        .starts_with(prefix.as_str())
    }
    | Pred::Recipient(who) => {
      item.is_recipient(who)
    }
    | Pred::CreatedBy(who) => {
      item.created_by.eq_ignore_ascii_case(who)
    }
    | Pred::Kind(kind) => item.kind == *kind,
    | Pred::Location(needle) => {
      item.location.as_ref().is_some_and(
        |loc| {
          loc
            .to_ascii_lowercase()
            .contains(needle.as_str())
        }
      )
    }
    | Pred::Dateless => item.is_dateless(),
    | Pred::TextContains(needle) => {
      item
        .title
        .to_ascii_lowercase()
        .contains(needle.as_str())
        || item
          .description
          .to_ascii_lowercase()
          .contains(needle.as_str())
    }
  }
}
