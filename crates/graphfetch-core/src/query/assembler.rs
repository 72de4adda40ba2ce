//! Query assembler: base shape, predicates and row cap to one query.

use graphfetch_proto::{OrderDirection, PageRequest};

use crate::catalog::Catalog;
use crate::error::Error;

use super::description::{
    entity_columns, JoinKind, JoinSpec, Predicate, QueryDescription, SortKey, TableSelect,
};

/// Join an association path onto a base path.
pub(crate) fn child_path(base: &str, rel: &str) -> String {
    if base.is_empty() {
        rel.to_string()
    } else {
        format!("{}.{}", base, rel)
    }
}

/// Builds query descriptions from resolved catalog metadata.
pub struct QueryAssembler<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueryAssembler<'a> {
    /// Create an assembler over a catalog.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Assemble the filtered root query for one page.
    ///
    /// Predicate paths become inner joins; an empty predicate set leaves the
    /// query unfiltered. Rows are ordered by the page's order keys and then
    /// by root identity. A page without a limit is capped at `row_cap`.
    pub fn assemble(
        &self,
        root: &str,
        predicates: &[Predicate],
        page: &PageRequest,
        row_cap: usize,
    ) -> Result<QueryDescription, Error> {
        let entity = self.catalog.entity(root)?;
        let mut query = QueryDescription::new(TableSelect::entity(entity));

        for predicate in predicates {
            if let Some(alias) = &predicate.alias {
                self.join_path(&mut query, root, "", alias, JoinKind::Inner, false)?;
            }
            query.predicates.push(predicate.clone());
        }

        self.order_root(&mut query, page)?;
        let (limit, offset) = window(page, row_cap)?;
        query.limit = Some(limit);
        query.offset = offset;
        Ok(query)
    }

    /// Join every association along `rel_path`, starting at `base_entity`.
    ///
    /// Aliases are full association paths prefixed with `base_path`, and the
    /// first hop hangs off the query root. Only the last hop takes the
    /// `fetched` flag.
    pub fn join_path(
        &self,
        query: &mut QueryDescription,
        base_entity: &str,
        base_path: &str,
        rel_path: &str,
        kind: JoinKind,
        fetched: bool,
    ) -> Result<(), Error> {
        let hops = self.catalog.resolve_relation_path(base_entity, rel_path)?;
        let mut parent: Option<String> = None;
        let mut alias = base_path.to_string();

        for (i, relation) in hops.iter().enumerate() {
            alias = child_path(&alias, &relation.name);
            let target = self.catalog.entity(&relation.to_entity)?;
            let last = i + 1 == hops.len();

            query.add_join(JoinSpec {
                alias: alias.clone(),
                parent: parent.clone(),
                entity: target.name.clone(),
                table: target.table.clone(),
                identity: target.identity_field.clone(),
                local_field: relation.from_field.clone(),
                remote_field: relation.to_field.clone(),
                kind,
                fetched: fetched && last,
                columns: if fetched && last {
                    entity_columns(target)
                } else {
                    Vec::new()
                },
            });
            parent = Some(alias.clone());
        }
        Ok(())
    }

    /// Order by the page's root fields, then by identity.
    fn order_root(&self, query: &mut QueryDescription, page: &PageRequest) -> Result<(), Error> {
        let root = self.catalog.entity(&query.root.entity)?;
        for order in &page.order_by {
            self.catalog.field(&root.name, &order.field)?;
            query.order_by.push(SortKey {
                alias: None,
                column: order.field.clone(),
                direction: order.direction,
            });
        }
        if !page.order_by.iter().any(|o| o.field == root.identity_field) {
            query.order_by.push(SortKey {
                alias: None,
                column: root.identity_field.clone(),
                direction: OrderDirection::Asc,
            });
        }
        Ok(())
    }
}

/// Resolve the row window of a page: explicit limit or the row cap.
pub(crate) fn window(page: &PageRequest, row_cap: usize) -> Result<(usize, usize), Error> {
    let limit = match page.limit {
        Some(0) => return Err(Error::InvalidPage("limit must be positive".into())),
        Some(limit) => limit as usize,
        None => row_cap,
    };
    Ok((limit, page.offset as usize))
}
