use georebase_common::{EntityId, Transform};
use georebase_kernel::{EntityData, EntityKind, World};

/// An editing command that can be applied to the world and reversed.
///
/// Each command carries enough context to undo itself.
#[derive(Debug, Clone)]
pub enum EditCommand {
    /// Spawn an entity. Undo = despawn it.
    Spawn { id: EntityId, data: EntityData },
    /// Despawn an entity. Undo = re-spawn it with its data.
    Despawn { id: EntityId, data: EntityData },
    /// Change an entity's relative transform. Undo = restore old transform.
    SetTransform {
        id: EntityId,
        old: Transform,
        new: Transform,
    },
}

impl EditCommand {
    /// Produce the inverse command (for undo).
    pub fn inverse(&self) -> Self {
        match self {
            Self::Spawn { id, data } => Self::Despawn {
                id: *id,
                data: data.clone(),
            },
            Self::Despawn { id, data } => Self::Spawn {
                id: *id,
                data: data.clone(),
            },
            Self::SetTransform { id, old, new } => Self::SetTransform {
                id: *id,
                old: *new,
                new: *old,
            },
        }
    }
}

/// A labelled group of commands that undo and redo together.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub label: String,
    pub commands: Vec<EditCommand>,
}

/// Errors from edit operations.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("entity {0:?} not found")]
    EntityNotFound(EntityId),
    #[error("no transaction is open")]
    NoOpenTransaction,
    #[error("transaction {0:?} is already open")]
    TransactionAlreadyOpen(String),
}

/// Editor with transactional undo/redo.
///
/// Every mutation made through the editor is recorded. Inside
/// `begin_transaction`/`commit_transaction` the records accumulate into one
/// undo step; outside, each mutation is its own step.
pub struct Editor {
    undo_stack: Vec<Transaction>,
    redo_stack: Vec<Transaction>,
    open: Option<Transaction>,
}

impl Editor {
    /// Create a new editor.
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            open: None,
        }
    }

    /// Open a transaction. Only one may be open at a time.
    pub fn begin_transaction(&mut self, label: &str) -> Result<(), EditError> {
        if let Some(open) = &self.open {
            return Err(EditError::TransactionAlreadyOpen(open.label.clone()));
        }
        tracing::debug!(label, "begin transaction");
        self.open = Some(Transaction {
            label: label.to_string(),
            commands: Vec::new(),
        });
        Ok(())
    }

    /// Close the open transaction and push it as one undo step. Empty
    /// transactions are discarded.
    pub fn commit_transaction(&mut self) -> Result<(), EditError> {
        let tx = self.open.take().ok_or(EditError::NoOpenTransaction)?;
        tracing::debug!(label = %tx.label, commands = tx.commands.len(), "commit transaction");
        if !tx.commands.is_empty() {
            self.undo_stack.push(tx);
            self.redo_stack.clear();
        }
        Ok(())
    }

    /// Roll back everything recorded in the open transaction and close it.
    pub fn cancel_transaction(&mut self, world: &mut World) -> Result<(), EditError> {
        let tx = self.open.take().ok_or(EditError::NoOpenTransaction)?;
        tracing::debug!(label = %tx.label, "cancel transaction");
        for cmd in tx.commands.iter().rev() {
            apply_command(world, &cmd.inverse());
        }
        Ok(())
    }

    pub fn is_transaction_open(&self) -> bool {
        self.open.is_some()
    }

    fn record(&mut self, cmd: EditCommand) {
        match &mut self.open {
            Some(tx) => tx.commands.push(cmd),
            None => {
                self.undo_stack.push(Transaction {
                    label: command_label(&cmd).to_string(),
                    commands: vec![cmd],
                });
                self.redo_stack.clear();
            }
        }
    }

    /// Spawn a root entity and record it.
    pub fn spawn(
        &mut self,
        world: &mut World,
        name: &str,
        kind: EntityKind,
        transform: Transform,
    ) -> EntityId {
        let id = world.spawn(name, kind, transform);
        if let Some(data) = world.get(id) {
            self.record(EditCommand::Spawn {
                id,
                data: data.clone(),
            });
        }
        id
    }

    /// Spawn a child entity and record it.
    pub fn spawn_child(
        &mut self,
        world: &mut World,
        parent: EntityId,
        name: &str,
        kind: EntityKind,
        transform: Transform,
    ) -> Result<EntityId, EditError> {
        let id = world
            .spawn_child(parent, name, kind, transform)
            .ok_or(EditError::EntityNotFound(parent))?;
        if let Some(data) = world.get(id) {
            self.record(EditCommand::Spawn {
                id,
                data: data.clone(),
            });
        }
        Ok(id)
    }

    /// Despawn an entity and its descendants as one undo step.
    pub fn despawn(&mut self, world: &mut World, id: EntityId) -> Result<(), EditError> {
        if !world.is_valid(id) {
            return Err(EditError::EntityNotFound(id));
        }
        let mut commands = Vec::new();
        collect_despawns(world, id, &mut commands);
        world.despawn(id);
        match &mut self.open {
            Some(tx) => tx.commands.extend(commands),
            None => {
                self.undo_stack.push(Transaction {
                    label: "Despawn".to_string(),
                    commands,
                });
                self.redo_stack.clear();
            }
        }
        Ok(())
    }

    /// Modify an entity's relative transform and record the change.
    pub fn set_transform(
        &mut self,
        world: &mut World,
        id: EntityId,
        new: Transform,
    ) -> Result<(), EditError> {
        let old = world
            .get(id)
            .ok_or(EditError::EntityNotFound(id))?
            .transform;
        world.set_transform(id, new);
        self.record(EditCommand::SetTransform { id, old, new });
        Ok(())
    }

    /// Undo the last transaction. Returns true if anything was undone.
    /// Refuses while a transaction is open.
    pub fn undo(&mut self, world: &mut World) -> bool {
        if self.open.is_some() {
            return false;
        }
        let Some(tx) = self.undo_stack.pop() else {
            return false;
        };
        tracing::debug!(label = %tx.label, "undo");
        for cmd in tx.commands.iter().rev() {
            apply_command(world, &cmd.inverse());
        }
        self.redo_stack.push(tx);
        true
    }

    /// Redo the last undone transaction. Returns true if anything was redone.
    pub fn redo(&mut self, world: &mut World) -> bool {
        if self.open.is_some() {
            return false;
        }
        let Some(tx) = self.redo_stack.pop() else {
            return false;
        };
        tracing::debug!(label = %tx.label, "redo");
        for cmd in &tx.commands {
            apply_command(world, cmd);
        }
        self.undo_stack.push(tx);
        true
    }

    /// Number of transactions on the undo stack.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of transactions on the redo stack.
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Whether there are transactions that can be undone.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether there are transactions that can be redone.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Label of the transaction `undo` would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|tx| tx.label.as_str())
    }

    /// Label of the transaction `redo` would reapply.
    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|tx| tx.label.as_str())
    }

    /// Drop the transaction `redo` would reapply, for undo steps whose
    /// side effects outside the world cannot be replayed. Returns its label.
    pub fn discard_redo(&mut self) -> Option<String> {
        let tx = self.redo_stack.pop()?;
        tracing::debug!(label = %tx.label, "discard redo");
        Some(tx.label)
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

fn command_label(cmd: &EditCommand) -> &'static str {
    match cmd {
        EditCommand::Spawn { .. } => "Spawn",
        EditCommand::Despawn { .. } => "Despawn",
        EditCommand::SetTransform { .. } => "Set Transform",
    }
}

/// Post-order: children are despawned before their parent, so undo (which
/// runs in reverse) respawns parents first.
fn collect_despawns(world: &World, id: EntityId, out: &mut Vec<EditCommand>) {
    for child in world.children_of(id) {
        collect_despawns(world, child, out);
    }
    if let Some(data) = world.get(id) {
        out.push(EditCommand::Despawn {
            id,
            data: data.clone(),
        });
    }
}

fn apply_command(world: &mut World, cmd: &EditCommand) {
    match cmd {
        EditCommand::Spawn { id, data } => {
            world.spawn_with_id(*id, data.clone());
        }
        EditCommand::Despawn { id, .. } => {
            world.despawn(*id);
        }
        EditCommand::SetTransform { id, new, .. } => {
            world.set_transform(*id, *new);
        }
    }
}
