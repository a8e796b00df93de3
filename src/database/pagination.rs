use serde::{Deserialize, Serialize};

use super::{
    error::{Error, ErrorKind},
    form::Form,
};
use crate::constants::MAX_PAGE_SIZE;

const INVALID_PAGE: &str = "Invalid page.";

/// Page-number pagination read from `page` and `limit` query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    query: Vec<(String, String)>,
}

impl Pagination {
    pub fn from_form(form: &Form, default_size: i64) -> Result<Self, Error> {
        // An unusable limit falls back to the default rather than failing.
        let limit = form
            .get_number::<i64>("limit")
            .ok()
            .flatten()
            .filter(|limit| *limit > 0)
            .map(|limit| limit.min(MAX_PAGE_SIZE))
            .unwrap_or(default_size);

        let page = match form.get_number::<i64>("page") {
            Ok(None) => 1,
            Ok(Some(page)) if page >= 1 => page,
            _ => return Err(ErrorKind::NotFound.new(INVALID_PAGE)),
        };
        if (page - 1).checked_mul(limit).is_none() {
            return Err(ErrorKind::NotFound.new(INVALID_PAGE));
        }

        let query = form
            .pairs()
            .filter(|(k, _)| *k != "page" && *k != "limit")
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        Ok(Self { page, limit, query })
    }

    pub fn first(limit: i64) -> Self {
        Self {
            page: 1,
            limit,
            query: vec![],
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    fn link(&self, path: &str, page: i64) -> String {
        let mut query = self.query.clone();
        query.push((String::from("page"), page.to_string()));
        query.push((String::from("limit"), self.limit.to_string()));

        match serde_urlencoded::to_string(&query) {
            Ok(query) => format!("{path}?{query}"),
            Err(_) => format!("{path}?page={page}&limit={}", self.limit),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        pagination: &Pagination,
        path: &str,
    ) -> Result<Self, Error> {
        if rows.is_empty() {
            if pagination.page > 1 {
                return Err(ErrorKind::NotFound.new(INVALID_PAGE));
            }
            return Ok(Self::no_rows());
        }

        let shown = pagination.offset().saturating_add(rows.len() as i64);
        let next = (shown < total_rows).then(|| pagination.link(path, pagination.page + 1));
        let previous = (pagination.page > 1).then(|| pagination.link(path, pagination.page - 1));

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }

    pub fn map<U, F>(self, f: F) -> PageContext<U>
    where
        F: FnMut(T) -> U,
    {
        PageContext {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pagination(query: &str) -> Result<Pagination, Error> {
        Pagination::from_form(&Form::from_query(query).unwrap(), 6)
    }

    #[test]
    fn defaults_and_limits() {
        let p = pagination("").unwrap();
        assert_eq!((p.page, p.limit, p.offset()), (1, 6, 0));

        let p = pagination("page=3&limit=10").unwrap();
        assert_eq!(p.offset(), 20);

        assert_eq!(pagination("limit=abc").unwrap().limit, 6);
        assert_eq!(pagination("limit=-2").unwrap().limit, 6);
        assert_eq!(pagination("limit=1000").unwrap().limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn invalid_pages_are_not_found() {
        assert_eq!(pagination("page=0").unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(pagination("page=x").unwrap_err().kind, ErrorKind::NotFound);

        let error = pagination("page=9223372036854775807&limit=6").unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.info, INVALID_PAGE);
        assert!(pagination("page=9223372036854775807&limit=1").is_ok());

        let p = pagination("page=4").unwrap();
        let page = PageContext::<i32>::from_rows(vec![], 3, &p, "/api/recipes");
        assert_eq!(page.unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn links_keep_filters() {
        let p = pagination("tags=lunch&page=2&limit=2").unwrap();
        let page = PageContext::from_rows(vec![3, 4], 5, &p, "/api/recipes").unwrap();

        assert_eq!(page.count, 5);
        assert_eq!(
            page.next.as_deref(),
            Some("/api/recipes?tags=lunch&page=3&limit=2")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("/api/recipes?tags=lunch&page=1&limit=2")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let p = pagination("page=3&limit=2").unwrap();
        let page = PageContext::from_rows(vec![5], 5, &p, "/api/users").unwrap();
        assert!(page.next.is_none());
        assert!(page.previous.is_some());
    }

    #[test]
    fn empty_first_page() {
        let page = PageContext::<i32>::from_rows(vec![], 0, &Pagination::first(6), "/x").unwrap();
        assert_eq!(page, PageContext::no_rows());
    }
}
