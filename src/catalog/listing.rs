//! Changelist queries.
//!
//! [`ListQuery`] turns the admin list options of an entity (search fields,
//! filters, ordering) plus the user's input into one SELECT. Lookups such as
//! `inventory_item__sku` become LEFT JOINs aliased by their path, so the
//! same relation is joined once no matter how many fields read through it.

use crate::catalog::forms::normalize;
use crate::catalog::meta::{AdminOptions, Entity, EntityMeta, FieldMeta};
use crate::catalog::{Catalog, CatalogError, Lookup, LOOKUP_SEP};
use crate::executor::DbExecutor;
use crate::migration::quote_ident;
use crate::value_conversion::with_converted_params;
use sea_query::{
    Condition, Expr, ExprTrait, Iden, JoinType, Order, PostgresQueryBuilder, Query,
    SelectStatement, Values,
};

/// Alias of the listed table
const ROOT: &str = "t0";

/// Rows per page when none is requested
pub const DEFAULT_PER_PAGE: u64 = 100;

/// Join alias built from a lookup path
#[derive(Debug, Clone)]
struct Alias(String);

impl Iden for Alias {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

/// One changelist request
///
/// # Example
///
/// ```rust
/// use forgedesk_admin::catalog::{Catalog, ListQuery};
/// use forgedesk_admin::catalog::inventory::INVENTORY_ITEM;
///
/// let (sql, _values) = ListQuery::new(&INVENTORY_ITEM)
///     .search("hinge")
///     .filter("status", "active")
///     .order_by("-stock")
///     .build(&Catalog::all())?;
/// assert!(sql.starts_with("SELECT"));
/// # Ok::<(), forgedesk_admin::catalog::CatalogError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ListQuery {
    meta: &'static EntityMeta,
    search: Option<String>,
    filters: Vec<(String, String)>,
    ordering: Vec<String>,
    page: u64,
    per_page: u64,
}

impl ListQuery {
    pub fn new(meta: &'static EntityMeta) -> Self {
        Self {
            meta,
            search: None,
            filters: Vec::new(),
            ordering: Vec::new(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::meta())
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    /// Whitespace separated terms; every term must match some search field
    pub fn search(mut self, terms: impl Into<String>) -> Self {
        let terms = terms.into();
        self.search = if terms.trim().is_empty() {
            None
        } else {
            Some(terms)
        };
        self
    }

    /// Equality filter on a `list_filter` field; an empty value matches NULL
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Add a sort key; prefix with `-` for descending
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.ordering.push(field.into());
        self
    }

    /// 1-based page number
    pub fn page(mut self, page: u64) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// The page SELECT
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for unknown filter or ordering fields and for
    /// lookups that do not resolve.
    pub fn build(&self, catalog: &Catalog) -> Result<(String, Values), CatalogError> {
        let mut select = Selection::new(catalog, self.meta);
        for field in self.meta.fields {
            select
                .query
                .expr(Expr::cust(qualified(ROOT, field.column)));
        }
        self.apply_conditions(&mut select)?;
        self.apply_ordering(&mut select)?;
        select
            .query
            .limit(self.per_page)
            .offset((self.page - 1).saturating_mul(self.per_page));
        Ok(select.query.build(PostgresQueryBuilder))
    }

    /// `SELECT COUNT(*)` over the same search and filters, for the paginator
    ///
    /// # Errors
    ///
    /// Same as [`ListQuery::build`].
    pub fn build_count(&self, catalog: &Catalog) -> Result<(String, Values), CatalogError> {
        let mut select = Selection::new(catalog, self.meta);
        select.query.expr_as(Expr::cust("COUNT(*)"), "total");
        self.apply_conditions(&mut select)?;
        Ok(select.query.build(PostgresQueryBuilder))
    }

    fn apply_conditions(&self, select: &mut Selection<'_>) -> Result<(), CatalogError> {
        let admin = self.meta.admin.unwrap_or(AdminOptions::EMPTY);

        for (name, value) in &self.filters {
            if !admin.list_filter.contains(&name.as_str()) {
                return Err(CatalogError::UnknownField {
                    entity: self.meta.name.to_string(),
                    field: name.clone(),
                });
            }
            let (alias, field) = select.lookup(name)?;
            let column = qualified(&alias, field.column);
            let value = value.trim();
            if value.is_empty() {
                select.query.and_where(Expr::cust(format!("{column} IS NULL")));
            } else {
                select.query.and_where(
                    Expr::cust(format!("CAST({column} AS TEXT)")).eq(normalize(field, value)),
                );
            }
        }

        let Some(terms) = &self.search else {
            return Ok(());
        };
        if admin.search_fields.is_empty() {
            log::debug!("{} has no search fields, ignoring search", self.meta.name);
            return Ok(());
        }
        let mut columns = Vec::with_capacity(admin.search_fields.len());
        for path in admin.search_fields {
            let (alias, field) = select.lookup(path)?;
            columns.push(qualified(&alias, field.column));
        }
        let mut all = Condition::all();
        for term in terms.split_whitespace() {
            let pattern = format!("%{}%", escape_like(&term.to_uppercase()));
            let mut any = Condition::any();
            for column in &columns {
                any = any.add(Expr::cust(format!("UPPER(CAST({column} AS TEXT))")).like(pattern.as_str()));
            }
            all = all.add(any);
        }
        select.query.cond_where(all);
        Ok(())
    }

    fn apply_ordering(&self, select: &mut Selection<'_>) -> Result<(), CatalogError> {
        let requested: Vec<&str> = if self.ordering.is_empty() {
            self.meta.changelist_ordering().to_vec()
        } else {
            self.ordering.iter().map(String::as_str).collect()
        };

        let mut ordered_by_pk = false;
        for key in requested {
            let (path, order) = match key.strip_prefix('-') {
                Some(path) => (path, Order::Desc),
                None => (key, Order::Asc),
            };
            if self.meta.is_derived(path) {
                return Err(CatalogError::InvalidLookup {
                    entity: self.meta.name.to_string(),
                    path: path.to_string(),
                    reason: "derived fields cannot be sorted".to_string(),
                });
            }
            let (alias, field) = select.lookup(path)?;
            ordered_by_pk |= alias == ROOT && field.primary_key;
            select
                .query
                .order_by_expr(Expr::cust(qualified(&alias, field.column)), order);
        }

        // Stable pages need a total order.
        if !ordered_by_pk {
            if let Some(pk) = self.meta.primary_key() {
                select
                    .query
                    .order_by_expr(Expr::cust(qualified(ROOT, pk.column)), Order::Asc);
            }
        }
        Ok(())
    }
}

/// A SELECT under construction plus the joins added so far
struct Selection<'a> {
    catalog: &'a Catalog,
    meta: &'static EntityMeta,
    query: SelectStatement,
    joined: Vec<String>,
}

impl<'a> Selection<'a> {
    fn new(catalog: &'a Catalog, meta: &'static EntityMeta) -> Self {
        let mut query = Query::select();
        query.from_as(meta.table, ROOT);
        Self {
            catalog,
            meta,
            query,
            joined: Vec::new(),
        }
    }

    /// Resolve `path`, joining each relation on the way, and return the
    /// alias of the table owning the final field
    fn lookup(&mut self, path: &str) -> Result<(String, &'static FieldMeta), CatalogError> {
        let Lookup { hops, field, .. } = self.catalog.resolve(self.meta, path)?;

        let mut alias = ROOT.to_string();
        let mut prefix: Vec<&str> = Vec::with_capacity(hops.len());
        for hop in &hops {
            prefix.push(hop.field.name);
            let join_alias = prefix.join(LOOKUP_SEP);
            if !self.joined.contains(&join_alias) {
                let pk = hop.to.primary_key().ok_or_else(|| CatalogError::InvalidLookup {
                    entity: self.meta.name.to_string(),
                    path: path.to_string(),
                    reason: format!("{} has no primary key", hop.to.name),
                })?;
                let on = format!(
                    "{} = {}",
                    qualified(&alias, hop.field.column),
                    qualified(&join_alias, pk.column)
                );
                self.query.join_as(
                    JoinType::LeftJoin,
                    hop.to.table,
                    Alias(join_alias.clone()),
                    Expr::cust(on),
                );
                self.joined.push(join_alias.clone());
            }
            alias = join_alias;
        }
        Ok((alias, field))
    }
}

fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Run `query` and decode each row as `E`
///
/// # Errors
///
/// Returns `CatalogError::Inconsistent` if `query` lists another entity,
/// `CatalogError::Database` if the query or a row decode fails.
pub fn fetch<E: Entity>(
    executor: &dyn DbExecutor,
    catalog: &Catalog,
    query: &ListQuery,
) -> Result<Vec<E>, CatalogError> {
    if query.meta.name != E::meta().name {
        return Err(CatalogError::Inconsistent(format!(
            "list query for {} decoded as {}",
            query.meta.name,
            E::meta().name
        )));
    }
    let (sql, values) = query.build(catalog)?;
    log::debug!("changelist {}: {sql}", query.meta.name);
    let records = with_converted_params(&values, |params| {
        executor
            .query_all(&sql, params)?
            .iter()
            .map(E::from_row)
            .collect()
    })?;
    Ok(records)
}

/// Total rows matching `query`, ignoring pagination
///
/// # Errors
///
/// Returns `CatalogError::Database` if the count query fails.
pub fn count(
    executor: &dyn DbExecutor,
    catalog: &Catalog,
    query: &ListQuery,
) -> Result<i64, CatalogError> {
    let (sql, values) = query.build_count(catalog)?;
    let total = with_converted_params(&values, |params| {
        let row = executor.query_one(&sql, params)?;
        crate::executor::column::<i64>(&row, "total")
    })?;
    Ok(total)
}
