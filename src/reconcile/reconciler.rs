//! Level-by-level application of a planned tree.

use tracing::{debug, error, info, info_span, warn};

use crate::{
    assets::{
        ObjectStore, UpsertPolicy,
        materialize::{cover_path, materialize, resource_path},
    },
    core::resolver::IdResolver,
    node::{AssetRef, ClassroomTree, LessonNode, ModuleNode, Mutation, ResourceNode},
    op::{Operation, PlacementCheck, interpret, needs_placement_check},
    persist::{ContentStore, StoreResult},
    record::{Entity, LessonDraft, ModuleDraft, Placement, ResourceDraft},
    types::{NodeId, RowId},
};

use super::{
    error::ReconcileError,
    plan::{Planned, plan},
    report::{DeleteFailure, OpCounts, StoredAsset, SyncReport},
};

/// Merges a client-edited [`ClassroomTree`] into the relational store.
///
/// Levels are processed strictly top-down (classroom, cover, modules,
/// lessons, resources) so every child resolves its parent through ids
/// bound earlier in the same pass. Deletes are collected on the way down
/// and applied leaf-first at the end; their failures are logged and
/// reported but never abort the pass.
pub struct Reconciler<'s> {
    store: &'s mut dyn ContentStore,
    objects: &'s mut dyn ObjectStore,
}

struct Pass {
    classroom_id: RowId,
    resolver: IdResolver,
    report: SyncReport,
    deletes: Vec<(Entity, RowId)>,
}

impl Pass {
    fn schedule_delete(&mut self, entity: Entity, row: RowId) {
        self.resolver.retire(row);
        self.deletes.push((entity, row));
    }
}

impl<'s> Reconciler<'s> {
    /// Borrows both stores for one or more passes.
    pub fn new(store: &'s mut dyn ContentStore, objects: &'s mut dyn ObjectStore) -> Self {
        Self { store, objects }
    }

    /// Runs one synchronization. On error, writes already issued stay
    /// applied.
    pub fn sync(&mut self, tree: &ClassroomTree) -> Result<SyncReport, ReconcileError> {
        let span = info_span!("sync", classroom_id = tree.id);
        let _guard = span.enter();

        let result = self.run(tree);
        match &result {
            Ok(report) => info!(
                modules = report.modules.writes(),
                lessons = report.lessons.writes(),
                resources = report.resources.writes(),
                promoted = report.id_map.len(),
                delete_failures = report.delete_failures.len(),
                "synchronization applied"
            ),
            Err(err) => error!(kind = err.kind(), %err, "synchronization aborted"),
        }
        result
    }

    fn run(&mut self, tree: &ClassroomTree) -> Result<SyncReport, ReconcileError> {
        let plan = plan(tree)?;
        let mut pass = Pass {
            classroom_id: tree.id,
            resolver: IdResolver::new(),
            report: SyncReport::new(tree.id),
            deletes: Vec::new(),
        };

        self.sync_classroom(tree, &mut pass)?;
        for planned in &plan.modules {
            self.sync_module(planned, &mut pass)?;
        }
        for planned in &plan.lessons {
            self.sync_lesson(planned, &mut pass)?;
        }
        for planned in &plan.resources {
            self.sync_resource(planned, &mut pass)?;
        }
        self.flush_deletes(&mut pass);

        let promoted: Vec<_> = pass
            .resolver
            .promotions()
            .map(|(token, row)| (token.clone(), row))
            .collect();
        pass.report.id_map.extend(promoted);
        Ok(pass.report)
    }

    fn sync_classroom(&mut self, tree: &ClassroomTree, pass: &mut Pass) -> Result<(), ReconcileError> {
        let id = tree.id;
        let current = self
            .store
            .classroom(id)
            .map_err(ReconcileError::read(Entity::Classroom))?
            .ok_or(ReconcileError::NotFound {
                entity: Entity::Classroom,
                id,
            })?;

        if tree.info_edited {
            updated(
                self.store.update_classroom_info(id, &tree.info),
                Entity::Classroom,
                id,
            )?;
            pass.report.classroom_updated = true;
        }
        if let Some(draft) = tree.draft {
            if draft != current.draft {
                updated(self.store.set_classroom_draft(id, draft), Entity::Classroom, id)?;
                pass.report.classroom_updated = true;
            }
        }

        let url = match &tree.cover {
            None => return Ok(()),
            Some(AssetRef::Url(url)) if current.cover_url.as_deref() == Some(url.as_str()) => {
                return Ok(());
            }
            Some(AssetRef::Url(url)) => url.clone(),
            Some(AssetRef::Inline(asset)) => {
                let path = cover_path(id, asset);
                materialize(&mut *self.objects, asset, &path, UpsertPolicy::Overwrite)?.url
            }
        };
        updated(self.store.set_classroom_cover(id, &url), Entity::Classroom, id)?;
        debug!(url, "cover rewritten");
        pass.report.cover_url = Some(url);
        Ok(())
    }

    fn sync_module(
        &mut self,
        planned: &Planned<'_, ModuleNode>,
        pass: &mut Pass,
    ) -> Result<(), ReconcileError> {
        let node = planned.node;
        let header = &node.header;
        let classification = header.id.classification();
        let Some(position) = planned.position else {
            return self.schedule_or_discard(Entity::Module, &header.id, pass);
        };
        let target = Placement {
            parent: pass.classroom_id,
            position,
        };

        let check = if needs_placement_check(classification, header.mutation) {
            let row = persistent(&header.id)?;
            let stored = self
                .store
                .module_placement(row)
                .map_err(ReconcileError::read(Entity::Module))?;
            match stored {
                Some(p) if p.parent != target.parent => {
                    return Err(ReconcileError::NotFound {
                        entity: Entity::Module,
                        id: row,
                    });
                }
                Some(p) => compare(p, target),
                None => {
                    return Err(ReconcileError::NotFound {
                        entity: Entity::Module,
                        id: row,
                    });
                }
            }
        } else {
            PlacementCheck::NotChecked
        };

        let op = interpret(classification, header.mutation, check);
        let row = match op {
            Operation::Insert => self
                .store
                .insert_module(&ModuleDraft {
                    classroom_id: pass.classroom_id,
                    position,
                    fields: node.fields(),
                })
                .map_err(ReconcileError::write(Entity::Module))?,
            Operation::Update => {
                let row = persistent(&header.id)?;
                updated(
                    self.store.update_module(row, target, &node.fields()),
                    Entity::Module,
                    row,
                )?;
                row
            }
            Operation::UpdateOrder => {
                let row = persistent(&header.id)?;
                updated(
                    self.store.update_module_position(row, target),
                    Entity::Module,
                    row,
                )?;
                row
            }
            Operation::Skip => persistent(&header.id)?,
            Operation::Delete => unreachable_delete(&header.id)?,
        };
        debug!(id = %header.id, row, ?op, position, "module");
        pass.report.modules.record(op);
        pass.resolver.bind(header.id.clone(), row);
        Ok(())
    }

    fn sync_lesson(
        &mut self,
        planned: &Planned<'_, LessonNode>,
        pass: &mut Pass,
    ) -> Result<(), ReconcileError> {
        let node = planned.node;
        let header = &node.header;
        let classification = header.id.classification();
        let Some(position) = planned.position else {
            return self.schedule_or_discard(Entity::Lesson, &header.id, pass);
        };
        let module_row = pass.resolver.resolve(parent_of(planned)?)?;
        let target = Placement {
            parent: module_row,
            position,
        };

        let check = if needs_placement_check(classification, header.mutation) {
            let row = persistent(&header.id)?;
            let stored = self
                .store
                .lesson_placement(row)
                .map_err(ReconcileError::read(Entity::Lesson))?
                .ok_or(ReconcileError::NotFound {
                    entity: Entity::Lesson,
                    id: row,
                })?;
            compare(stored, target)
        } else {
            PlacementCheck::NotChecked
        };

        let op = interpret(classification, header.mutation, check);
        let classroom_id = pass.classroom_id;
        let row = match op {
            Operation::Insert => self
                .store
                .insert_lesson(&LessonDraft {
                    module_id: module_row,
                    position,
                    fields: node.fields(),
                })
                .map_err(ReconcileError::write(Entity::Lesson))?,
            Operation::Update => {
                let row = persistent(&header.id)?;
                updated(
                    self.store
                        .update_lesson(classroom_id, row, target, &node.fields()),
                    Entity::Lesson,
                    row,
                )?;
                row
            }
            Operation::UpdateOrder => {
                let row = persistent(&header.id)?;
                updated(
                    self.store.move_lesson(classroom_id, row, target),
                    Entity::Lesson,
                    row,
                )?;
                row
            }
            Operation::Skip => persistent(&header.id)?,
            Operation::Delete => unreachable_delete(&header.id)?,
        };
        debug!(id = %header.id, row, module = module_row, ?op, position, "lesson");
        pass.report.lessons.record(op);
        pass.resolver.bind(header.id.clone(), row);
        Ok(())
    }

    fn sync_resource(
        &mut self,
        planned: &Planned<'_, ResourceNode>,
        pass: &mut Pass,
    ) -> Result<(), ReconcileError> {
        let node = planned.node;
        let header = &node.header;
        let classification = header.id.classification();
        let Some(position) = planned.position else {
            return self.schedule_or_discard(Entity::Resource, &header.id, pass);
        };
        let lesson_row = pass.resolver.resolve(parent_of(planned)?)?;
        let target = Placement {
            parent: lesson_row,
            position,
        };

        // Stored resources are always looked up; position is their only
        // rewritable column.
        let check = match header.id.persistent() {
            Some(row) => {
                let stored = self
                    .store
                    .resource_placement(row)
                    .map_err(ReconcileError::read(Entity::Resource))?;
                match stored {
                    Some(p) if p.parent == target.parent => compare(p, target),
                    _ => {
                        return Err(ReconcileError::NotFound {
                            entity: Entity::Resource,
                            id: row,
                        });
                    }
                }
            }
            None => PlacementCheck::NotChecked,
        };

        let op = interpret(classification, header.mutation, check);
        let row = match op {
            Operation::Insert => {
                let row = self.insert_resource(node, lesson_row, position, pass)?;
                debug!(id = %header.id, row, lesson = lesson_row, position, "resource inserted");
                pass.report.resources.record(Operation::Insert);
                row
            }
            Operation::Update | Operation::UpdateOrder if check == PlacementCheck::Drifted => {
                let row = persistent(&header.id)?;
                updated(
                    self.store
                        .update_resource_position(pass.classroom_id, row, position),
                    Entity::Resource,
                    row,
                )?;
                debug!(id = %header.id, row, position, "resource repositioned");
                pass.report.resources.record(Operation::UpdateOrder);
                row
            }
            Operation::Update | Operation::UpdateOrder | Operation::Skip => {
                if op == Operation::Update {
                    debug!(id = %header.id, "ignoring field edits on stored resource");
                }
                pass.report.resources.record(Operation::Skip);
                persistent(&header.id)?
            }
            Operation::Delete => unreachable_delete(&header.id)?,
        };
        pass.resolver.bind(header.id.clone(), row);
        Ok(())
    }

    fn insert_resource(
        &mut self,
        node: &ResourceNode,
        lesson_row: RowId,
        position: i64,
        pass: &mut Pass,
    ) -> Result<RowId, ReconcileError> {
        let mut draft = ResourceDraft {
            lesson_id: lesson_row,
            position,
            kind: node.kind,
            url: String::new(),
            display_name: node.display_name.clone(),
            file_type: node.file_type.clone(),
            file_size: node.file_size,
        };

        let asset = match &node.url {
            AssetRef::Url(url) => {
                draft.url = url.clone();
                None
            }
            AssetRef::Inline(inline) => {
                let path = resource_path(lesson_row, &node.display_name, inline);
                let materialized = materialize(&mut *self.objects, inline, &path, UpsertPolicy::Reject)?;
                draft.url = materialized.url.clone();
                draft.file_size = Some(materialized.size);
                if materialized.extension.is_some() {
                    draft.file_type = materialized.extension.clone();
                }
                Some(materialized)
            }
        };

        let row = match self.store.insert_resource(&draft) {
            Ok(row) => row,
            Err(source) => {
                if let Some(orphan) = &asset {
                    if let Err(err) = self.objects.remove(&orphan.path) {
                        warn!(path = orphan.path, %err, "could not remove orphaned upload");
                    }
                }
                return Err(ReconcileError::StoreWriteFailed {
                    entity: Entity::Resource,
                    source,
                });
            }
        };

        if let Some(materialized) = asset {
            pass.report.resource_assets.insert(
                row,
                StoredAsset {
                    url: materialized.url,
                    size: materialized.size,
                    extension: draft.file_type,
                },
            );
        }
        Ok(row)
    }

    fn schedule_or_discard(
        &mut self,
        entity: Entity,
        id: &NodeId,
        pass: &mut Pass,
    ) -> Result<(), ReconcileError> {
        let op = interpret(
            id.classification(),
            Mutation::Deleted,
            PlacementCheck::NotChecked,
        );
        match (op, id) {
            (Operation::Delete, NodeId::Persistent(row)) => pass.schedule_delete(entity, *row),
            _ => {
                debug!(%entity, %id, "discarding client-local node");
                if let Some(counts) = counts_mut(&mut pass.report, entity) {
                    counts.record(Operation::Skip);
                }
            }
        }
        Ok(())
    }

    fn flush_deletes(&mut self, pass: &mut Pass) {
        let classroom_id = pass.classroom_id;
        for level in [Entity::Resource, Entity::Lesson, Entity::Module] {
            let rows: Vec<RowId> = pass
                .deletes
                .iter()
                .filter(|(entity, _)| *entity == level)
                .map(|(_, row)| *row)
                .collect();
            for row in rows {
                let result = match level {
                    Entity::Resource => self.store.delete_resource(classroom_id, row),
                    Entity::Lesson => self.store.delete_lesson(classroom_id, row),
                    _ => self.store.delete_module(classroom_id, row),
                };
                match result {
                    Ok(removed) => {
                        if !removed {
                            debug!(entity = %level, row, "already absent");
                        }
                        if let Some(counts) = counts_mut(&mut pass.report, level) {
                            counts.record(Operation::Delete);
                        }
                    }
                    Err(source) => {
                        let err = ReconcileError::StoreDeleteFailed {
                            entity: level,
                            id: row,
                            source,
                        };
                        warn!(%err, "delete failed; continuing");
                        pass.report.delete_failures.push(DeleteFailure {
                            entity: level,
                            id: row,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
    }
}

fn counts_mut(report: &mut SyncReport, entity: Entity) -> Option<&mut OpCounts> {
    match entity {
        Entity::Module => Some(&mut report.modules),
        Entity::Lesson => Some(&mut report.lessons),
        Entity::Resource => Some(&mut report.resources),
        Entity::Classroom => None,
    }
}

fn compare(stored: Placement, target: Placement) -> PlacementCheck {
    if stored == target {
        PlacementCheck::Matches
    } else {
        PlacementCheck::Drifted
    }
}

fn updated(result: StoreResult<bool>, entity: Entity, id: RowId) -> Result<(), ReconcileError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(ReconcileError::NotFound { entity, id }),
        Err(source) => Err(ReconcileError::StoreWriteFailed { entity, source }),
    }
}

fn persistent(id: &NodeId) -> Result<RowId, ReconcileError> {
    id.persistent()
        .ok_or_else(|| ReconcileError::UnresolvedReference { id: id.clone() })
}

fn parent_of<'p, N>(planned: &'p Planned<'_, N>) -> Result<&'p NodeId, ReconcileError> {
    planned
        .parent
        .as_ref()
        .ok_or_else(|| ReconcileError::InvalidTree("child node without a parent".to_string()))
}

fn unreachable_delete(id: &NodeId) -> Result<RowId, ReconcileError> {
    Err(ReconcileError::InvalidTree(format!(
        "node {id} planned as live but interpreted as deleted"
    )))
}
