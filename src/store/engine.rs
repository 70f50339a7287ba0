//! Keyword index over tantivy, shared by the event and job collections.
//!
//! Each document is kept as its JSON source plus one indexed field per
//! mapped attribute. Keyword fields are untokenized and fast, so they serve
//! exact filters and terms aggregations alike. Dates keep microsecond
//! precision. Every document also carries a numeric order key derived from
//! the mapping's `order_by` date, and results come back in descending key
//! order.

use std::marker::PhantomData;
use std::ops::Bound;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tantivy::aggregation::agg_req::{Aggregation, AggregationVariants, Aggregations};
use tantivy::aggregation::bucket::TermsAggregation;
use tantivy::aggregation::{AggregationCollector, AggregationLimits};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{
    DateOptions, DateTimePrecision, FAST, Field, INDEXED, IndexRecordOption, STORED, STRING,
    Schema, Value as _,
};
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument,
    Term,
};

use super::error::{Result, StoreError};

/// Upper bound on hits returned by a single query.
pub const MAX_RESULTS: usize = 10_000;

const SOURCE_FIELD: &str = "_source";
const ORDER_FIELD: &str = "_order";

const WRITER_THREADS: usize = 1;
const WRITER_MEMORY_BUDGET: usize = 20_000_000;

/// Field layout of one collection.
#[derive(Debug)]
pub struct Mapping {
    /// Keyword field holding the unique key. Upserts replace by it.
    pub id: &'static str,
    pub keywords: &'static [&'static str],
    pub dates: &'static [&'static str],
    pub numbers: &'static [&'static str],
    /// Date field results are ordered by, newest first. Documents without
    /// it come last.
    pub order_by: &'static str,
}

impl Mapping {
    fn schema(&self) -> Schema {
        let mut builder = Schema::builder();
        for &name in self.keywords {
            builder.add_text_field(name, STRING | FAST);
        }
        let date_options = DateOptions::default()
            .set_indexed()
            .set_fast()
            .set_precision(DateTimePrecision::Microseconds);
        for &name in self.dates {
            builder.add_date_field(name, date_options.clone());
        }
        for &name in self.numbers {
            builder.add_u64_field(name, INDEXED | FAST);
        }
        builder.add_u64_field(ORDER_FIELD, FAST);
        builder.add_text_field(SOURCE_FIELD, STORED);
        builder.build()
    }
}

/// Value of one mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// Empty keywords are not indexed.
    Keyword(&'a str),
    Date(DateTime<Utc>),
    Number(u64),
}

/// A record the index can store.
pub trait Document: Serialize + DeserializeOwned {
    fn id(&self) -> &str;

    fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)>;
}

/// Query, paging and facets of one search.
pub struct SearchRequest {
    query: Box<dyn Query>,
    from: usize,
    size: usize,
    facets: Vec<(&'static str, u32)>,
}

impl SearchRequest {
    pub fn new(query: Box<dyn Query>) -> Self {
        SearchRequest {
            query,
            from: 0,
            size: MAX_RESULTS,
            facets: Vec::new(),
        }
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Counts the `size` most frequent terms of `field` over all matches.
    pub fn add_facet(mut self, field: &'static str, size: u32) -> Self {
        self.facets.push((field, size));
        self
    }
}

/// Term counts of one facet. `other` counts matches whose term is outside
/// the top terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetResult {
    pub field: &'static str,
    pub terms: Vec<(String, usize)>,
    pub other: usize,
}

#[derive(Debug, Clone)]
pub struct SearchResult<D> {
    pub hits: Vec<D>,
    /// Number of matches, regardless of paging.
    pub total: usize,
    pub facets: Vec<FacetResult>,
}

pub struct KeywordIndex<D> {
    mapping: &'static Mapping,
    index: Index,
    schema: Schema,
    reader: IndexReader,
    /// `None` once closed.
    writer: Mutex<Option<IndexWriter>>,
    id_field: Field,
    order_field: Field,
    source_field: Field,
    documents: PhantomData<fn() -> D>,
}

impl<D: Document> KeywordIndex<D> {
    pub fn in_memory(mapping: &'static Mapping) -> Result<Self> {
        Self::with_index(Index::create_in_ram(mapping.schema()), mapping)
    }

    /// Opens the index stored in `dir`, creating one if the directory holds
    /// none. Fails if the stored schema differs from `mapping`.
    pub fn open_in_dir(dir: &Path, mapping: &'static Mapping) -> Result<Self> {
        let directory = MmapDirectory::open(dir)?;
        let index = Index::open_or_create(directory, mapping.schema())?;
        Self::with_index(index, mapping)
    }

    fn with_index(index: Index, mapping: &'static Mapping) -> Result<Self> {
        let schema = index.schema();
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(WRITER_THREADS, WRITER_MEMORY_BUDGET)?;

        Ok(KeywordIndex {
            id_field: schema.get_field(mapping.id)?,
            order_field: schema.get_field(ORDER_FIELD)?,
            source_field: schema.get_field(SOURCE_FIELD)?,
            writer: Mutex::new(Some(writer)),
            mapping,
            index,
            schema,
            reader,
            documents: PhantomData,
        })
    }

    // ─── Writes ───

    /// Inserts `document`, replacing any document with the same ID.
    pub fn upsert(&self, document: &D) -> Result<()> {
        let id = document.id();
        if id.is_empty() {
            return Err(StoreError::MissingId(self.mapping.id));
        }
        let indexed = self.to_tantivy(document)?;

        self.write(|writer| {
            writer.delete_term(Term::from_field_text(self.id_field, id));
            writer.add_document(indexed)?;
            Ok(())
        })
    }

    /// Removes the documents with the given IDs and returns how many of them
    /// existed.
    pub fn delete(&self, ids: &[&str]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.write(|writer| {
            let searcher = self.reader.searcher();
            let mut existed = 0;
            for &id in ids {
                let term = Term::from_field_text(self.id_field, id);
                existed += searcher.search(
                    &TermQuery::new(term.clone(), IndexRecordOption::Basic),
                    &Count,
                )?;
                writer.delete_term(term);
            }
            Ok(existed)
        })
    }

    /// Runs `ops` against the writer, then commits and reloads the reader.
    /// A failing `ops` rolls back everything it queued.
    fn write<T>(&self, ops: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        let mut slot = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = slot.as_mut().ok_or(StoreError::Closed)?;

        let value = match ops(writer) {
            Ok(value) => value,
            Err(e) => {
                writer.rollback()?;
                return Err(e);
            }
        };
        writer.commit()?;
        self.reader.reload()?;
        Ok(value)
    }

    /// Commits and releases the writer. Later writes fail with
    /// [`StoreError::Closed`]; reads keep working.
    pub fn close(&self) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut writer) = writer {
            writer.commit()?;
            writer.wait_merging_threads()?;
        }
        Ok(())
    }

    fn to_tantivy(&self, document: &D) -> Result<TantivyDocument> {
        let mut indexed = TantivyDocument::default();
        indexed.add_text(self.source_field, serde_json::to_string(document)?);

        let mut order = 0;
        for (name, value) in document.fields() {
            let field = self.schema.get_field(name)?;
            match value {
                FieldValue::Keyword("") => {}
                FieldValue::Keyword(text) => indexed.add_text(field, text),
                FieldValue::Date(time) => {
                    if name == self.mapping.order_by {
                        order = order_key(time);
                    }
                    indexed.add_date(field, to_tantivy_date(time));
                }
                FieldValue::Number(n) => indexed.add_u64(field, n),
            }
        }
        indexed.add_u64(self.order_field, order);
        Ok(indexed)
    }

    // ─── Reads ───

    pub fn get(&self, id: &str) -> Result<Option<D>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.id_field, id),
            IndexRecordOption::Basic,
        );
        let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
        hits.first()
            .map(|&(_, address)| self.load(&searcher, address))
            .transpose()
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses a query string such as `+Kind:push -Sender:bot`. Terms without
    /// a field search every keyword field.
    pub fn parse(&self, text: &str) -> Result<Box<dyn Query>> {
        let default_fields = self
            .mapping
            .keywords
            .iter()
            .map(|name| self.schema.get_field(name))
            .collect::<tantivy::Result<Vec<_>>>()?;
        Ok(QueryParser::for_index(&self.index, default_fields).parse_query(text)?)
    }

    /// Conjunction of a query string and exact keyword filters. A blank
    /// query string and empty filter values are left out; with nothing left
    /// the query matches every document.
    pub fn filtered(&self, text: &str, filters: &[(&str, &str)]) -> Result<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        if !text.trim().is_empty() {
            clauses.push((Occur::Must, self.parse(text)?));
        }
        for &(name, value) in filters {
            if value.is_empty() {
                continue;
            }
            let term = Term::from_field_text(self.schema.get_field(name)?, value);
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        Ok(if clauses.is_empty() {
            Box::new(AllQuery)
        } else {
            Box::new(BooleanQuery::new(clauses))
        })
    }

    /// Documents whose `field` lies strictly before `cutoff`.
    pub fn before(&self, field: &str, cutoff: DateTime<Utc>) -> Box<dyn Query> {
        Box::new(RangeQuery::new_date_bounds(
            field.to_string(),
            Bound::Unbounded,
            Bound::Excluded(to_tantivy_date(cutoff)),
        ))
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult<D>> {
        let searcher = self.reader.searcher();
        let query = request.query.as_ref();

        let total = searcher.search(query, &Count)?;

        let hits = if request.size == 0 {
            Vec::new()
        } else {
            let top = TopDocs::with_limit(request.size)
                .and_offset(request.from)
                .order_by_fast_field::<u64>(ORDER_FIELD, Order::Desc);
            searcher
                .search(query, &top)?
                .into_iter()
                .map(|(_, address)| self.load(&searcher, address))
                .collect::<Result<Vec<_>>>()?
        };

        let facets = if request.facets.is_empty() {
            Vec::new()
        } else {
            let collector = AggregationCollector::from_aggs(
                terms_aggregations(&request.facets),
                AggregationLimits::default(),
            );
            let results = serde_json::to_value(searcher.search(query, &collector)?)?;
            facet_results(&request.facets, &results)
        };

        Ok(SearchResult {
            hits,
            total,
            facets,
        })
    }

    fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<D> {
        let stored: TantivyDocument = searcher.doc(address)?;
        let source = stored
            .get_first(self.source_field)
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        Ok(serde_json::from_str(source)?)
    }
}

fn to_tantivy_date(time: DateTime<Utc>) -> tantivy::DateTime {
    tantivy::DateTime::from_timestamp_micros(time.timestamp_micros())
}

/// Order-preserving map of a timestamp onto `u64`. Zero is left for
/// documents without one.
fn order_key(time: DateTime<Utc>) -> u64 {
    (time.timestamp_micros() as u64 ^ (1 << 63)).max(1)
}

fn terms_aggregations(facets: &[(&'static str, u32)]) -> Aggregations {
    facets
        .iter()
        .map(|&(field, size)| {
            let terms = TermsAggregation {
                field: field.to_string(),
                size: Some(size),
                ..TermsAggregation::default()
            };
            let aggregation = Aggregation {
                agg: AggregationVariants::Terms(terms),
                sub_aggregation: Aggregations::default(),
            };
            (field.to_string(), aggregation)
        })
        .collect()
}

/// Reads terms buckets out of serialized aggregation results.
fn facet_results(
    facets: &[(&'static str, u32)],
    results: &serde_json::Value,
) -> Vec<FacetResult> {
    let count = |value: &serde_json::Value| {
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    };

    facets
        .iter()
        .map(|&(field, _)| {
            let result = &results[field];
            let terms = result["buckets"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|bucket| {
                    let term = bucket["key"].as_str()?.to_string();
                    Some((term, count(&bucket["doc_count"])))
                })
                .collect();
            FacetResult {
                field,
                terms,
                other: count(&result["sum_other_doc_count"]),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    static NOTES: Mapping = Mapping {
        id: "Id",
        keywords: &["Id", "Tag"],
        dates: &["At"],
        numbers: &["Size"],
        order_by: "At",
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        tag: String,
        at: Option<DateTime<Utc>>,
        size: u64,
    }

    impl Document for Note {
        fn id(&self) -> &str {
            &self.id
        }

        fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
            let mut fields = vec![
                ("Id", FieldValue::Keyword(&self.id)),
                ("Tag", FieldValue::Keyword(&self.tag)),
                ("Size", FieldValue::Number(self.size)),
            ];
            if let Some(at) = self.at {
                fields.push(("At", FieldValue::Date(at)));
            }
            fields
        }
    }

    fn note(id: &str, tag: &str, minute: Option<u32>) -> Note {
        Note {
            id: id.to_string(),
            tag: tag.to_string(),
            at: minute.map(|m| Utc.with_ymd_and_hms(2024, 5, 1, 12, m, 0).unwrap()),
            size: 10,
        }
    }

    fn ids(result: &SearchResult<Note>) -> Vec<&str> {
        result.hits.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn upsert_replaces_by_id() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "red", Some(1))).unwrap();
        index.upsert(&note("a", "blue", Some(1))).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a").unwrap().unwrap().tag, "blue");
    }

    #[test]
    fn empty_id_is_rejected() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        let result = index.upsert(&note("", "red", None));
        assert!(matches!(result, Err(StoreError::MissingId("Id"))));
        assert!(index.is_empty());
    }

    #[test]
    fn hits_are_newest_first_with_undated_last() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        for (id, minute) in [("a", Some(5)), ("b", None), ("c", Some(30)), ("d", Some(0))] {
            index.upsert(&note(id, "red", minute)).unwrap();
        }

        let result = index.search(&SearchRequest::new(Box::new(AllQuery))).unwrap();
        assert_eq!(ids(&result), vec!["c", "a", "d", "b"]);

        let page = index
            .search(&SearchRequest::new(Box::new(AllQuery)).with_from(1).with_size(2))
            .unwrap();
        assert_eq!(ids(&page), vec!["a", "d"]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn filters_match_keywords_verbatim() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "PR-7", Some(1))).unwrap();
        index.upsert(&note("b", "pr-7", Some(2))).unwrap();

        let query = index.filtered("", &[("Tag", "PR-7"), ("Id", "")]).unwrap();
        let result = index.search(&SearchRequest::new(query)).unwrap();
        assert_eq!(ids(&result), vec!["a"]);
    }

    #[test]
    fn query_string_supports_fields_and_ranges() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "red", Some(1))).unwrap();
        index
            .upsert(&Note {
                size: 500,
                ..note("b", "blue", Some(2))
            })
            .unwrap();

        let by_tag = index.parse("+Tag:blue").unwrap();
        assert_eq!(ids(&index.search(&SearchRequest::new(by_tag)).unwrap()), vec!["b"]);

        let by_size = index.parse("Size:[100 TO *]").unwrap();
        assert_eq!(ids(&index.search(&SearchRequest::new(by_size)).unwrap()), vec!["b"]);

        let by_date = index.parse("At:[2024-05-01T12:02:00Z TO *]").unwrap();
        assert_eq!(ids(&index.search(&SearchRequest::new(by_date)).unwrap()), vec!["b"]);
    }

    #[test]
    fn unknown_field_is_a_query_error() {
        let index = KeywordIndex::<Note>::in_memory(&NOTES).unwrap();
        assert!(matches!(index.parse("Nope:x"), Err(StoreError::Query(_))));
    }

    #[test]
    fn before_excludes_the_cutoff() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "red", Some(1))).unwrap();
        index.upsert(&note("b", "red", Some(2))).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 12, 2, 0).unwrap();
        let result = index.search(&SearchRequest::new(index.before("At", cutoff))).unwrap();
        assert_eq!(ids(&result), vec!["a"]);
    }

    #[test]
    fn facets_split_top_terms_and_other() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        let tags = ["red", "red", "red", "blue", "blue", "green", ""];
        for (i, tag) in tags.into_iter().enumerate() {
            index.upsert(&note(&format!("n{i}"), tag, Some(i as u32))).unwrap();
        }

        let request = SearchRequest::new(Box::new(AllQuery)).add_facet("Tag", 2);
        let facet = &index.search(&request).unwrap().facets[0];
        assert_eq!(facet.field, "Tag");
        assert_eq!(
            facet.terms,
            vec![("red".to_string(), 3), ("blue".to_string(), 2)]
        );
        assert_eq!(facet.other, 1);
    }

    #[test]
    fn delete_reports_existing_documents() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "red", Some(1))).unwrap();

        assert_eq!(index.delete(&["a", "ghost"]).unwrap(), 1);
        assert!(index.get("a").unwrap().is_none());
        assert_eq!(index.delete(&["a"]).unwrap(), 0);
    }

    #[test]
    fn searches_do_not_wait_for_the_writer() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "red", Some(1))).unwrap();

        let _writer = index.writer.lock().unwrap();
        let result = index.search(&SearchRequest::new(Box::new(AllQuery))).unwrap();
        assert_eq!(ids(&result), vec!["a"]);
        assert!(index.get("a").unwrap().is_some());
    }

    #[test]
    fn closed_index_rejects_writes() {
        let index = KeywordIndex::in_memory(&NOTES).unwrap();
        index.upsert(&note("a", "red", Some(1))).unwrap();
        index.close().unwrap();

        assert!(matches!(
            index.upsert(&note("b", "red", Some(2))),
            Err(StoreError::Closed)
        ));
        assert!(index.get("a").unwrap().is_some());
    }
}
