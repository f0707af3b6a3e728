//! Render routine tables
//!
//! Each [`Renderable`] type declares, per backend type, one strongly-typed
//! routine. The table is keyed by the backend's `TypeId`, so dispatch is a
//! lookup against the concrete backend of the running context. Declaring a
//! second routine for a backend that already has one is rejected when the
//! table is built.

use crate::changes::type_name;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::target::Backend;
use crate::task::Renderable;
use std::any::{Any, TypeId};

type RenderFn<T> =
    Box<dyn Fn(&dyn Any, &Context, Option<&T>, &T, &T) -> anyhow::Result<()> + Send + Sync>;

struct Routine<T> {
    target: TypeId,
    target_name: String,
    render: RenderFn<T>,
}

/// The render routines declared by one task type
pub struct Renderers<T> {
    routines: Vec<Routine<T>>,
}

impl<T: Renderable> Renderers<T> {
    /// Build the table by asking the type to declare its routines
    pub fn declare() -> Result<Self> {
        let mut renderers = Self {
            routines: Vec::new(),
        };
        T::renderers(&mut renderers)?;
        log::trace!(
            "{} declares renderers for [{}]",
            type_name::<T>(),
            renderers.targets().collect::<Vec<_>>().join(", ")
        );
        Ok(renderers)
    }

    /// Declare the routine applying `T` to backend `K`
    ///
    /// The routine receives the backend, the running context, and then
    /// `actual`, `expected` and `changes` in that order.
    pub fn on<K, F>(&mut self, render: F) -> Result<&mut Self>
    where
        K: Backend,
        F: Fn(&K, &Context, Option<&T>, &T, &T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let target = TypeId::of::<K>();
        if self.routines.iter().any(|r| r.target == target) {
            return Err(Error::AmbiguousRenderer {
                task_type: type_name::<T>(),
                target: type_name::<K>(),
            });
        }

        self.routines.push(Routine {
            target,
            target_name: type_name::<K>(),
            render: Box::new(
                move |backend: &dyn Any, ctx: &Context, a: Option<&T>, e: &T, changes: &T| {
                    let backend = backend.downcast_ref::<K>().ok_or_else(|| {
                        anyhow::anyhow!(
                            "render routine called with a backend other than {}",
                            type_name::<K>()
                        )
                    })?;
                    render(backend, ctx, a, e, changes)
                },
            ),
        });
        Ok(self)
    }

    /// Whether a routine is declared for backend `K`
    pub fn supports<K: Backend>(&self) -> bool {
        let target = TypeId::of::<K>();
        self.routines.iter().any(|r| r.target == target)
    }

    /// Names of the backend types with a declared routine
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.routines.iter().map(|r| r.target_name.as_str())
    }

    pub(crate) fn dispatch(
        &self,
        backend: &dyn Backend,
        ctx: &Context,
        actual: Option<&T>,
        expected: &T,
        changes: &T,
    ) -> Result<()> {
        let kind = backend.kind();
        let backend: &dyn Any = backend;
        let target = Any::type_id(backend);

        let Some(routine) = self.routines.iter().find(|r| r.target == target) else {
            return Err(Error::NoRenderer {
                task_type: type_name::<T>(),
                target: kind.to_string(),
            });
        };

        log::debug!(
            "Calling {} renderer for {}/{}",
            routine.target_name,
            type_name::<T>(),
            expected.name()
        );
        (routine.render)(backend, ctx, actual, expected, changes).map_err(|source| Error::Task {
            task: format!("{}/{}", type_name::<T>(), expected.name()),
            source,
        })
    }
}
