//! The engine context: every component, the shared recycle bin and frame
//! cache, and the per-frame control flow.
//!
//! A frame runs in this order:
//!
//! 1. resolve the draw order (only when registrations or references changed)
//! 2. open the frame cache, capturing the shared snapshots components need
//! 3. draw each visible component, then capture its referenced outputs
//! 4. close the frame cache and flush the recycle bin

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use serde::Serialize;

use crate::builtins::{
    local_date, BuiltInRegistry, FrameClock, HostCapabilities, MouseTracker, SetupContext,
    ViewState,
};
use crate::component::{ComponentId, InputValue, ShaderComponent};
use crate::draw_order::{DrawNode, DrawOrderResolver};
use crate::error::{EngineError, ShaderError};
use crate::frame_cache::{FrameCache, FrameRequirements};
use crate::gl::GraphicsApi;
use crate::recycle::RecycleBin;

/// What happened during one [`ShaderEngine::draw_frame`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    /// Components that drew, in draw order.
    pub drawn: Vec<String>,
    /// Visible components whose program is not linked.
    pub failed: Vec<String>,
    /// Vertices or indices submitted.
    pub elements: usize,
    /// Built-in failures reported for the first time this frame.
    pub builtin_errors: Vec<String>,
    /// GPU objects deleted when the frame closed.
    pub recycled: usize,
    /// The frame was skipped because rendering is unavailable.
    pub context_unavailable: bool,
}

/// Owns everything that was process-wide state in a plug-in host.
#[derive(Debug)]
pub struct ShaderEngine {
    registry: BuiltInRegistry,
    components: Vec<ShaderComponent>,
    recycle_bin: RecycleBin,
    frame_cache: FrameCache,
    order: DrawOrderResolver,
    mouse: MouseTracker,
    clock: FrameClock,
    capabilities: HostCapabilities,
    unavailable: Option<String>,
    reported: HashSet<&'static str>,
}

impl Default for ShaderEngine {
    fn default() -> Self {
        Self::new(HostCapabilities::default())
    }
}

impl ShaderEngine {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self::with_registry(BuiltInRegistry::standard(), capabilities)
    }

    pub fn with_registry(registry: BuiltInRegistry, capabilities: HostCapabilities) -> Self {
        Self {
            registry,
            components: Vec::new(),
            recycle_bin: RecycleBin::new(),
            frame_cache: FrameCache::new(),
            order: DrawOrderResolver::new(),
            mouse: MouseTracker::new(),
            clock: FrameClock::new(),
            capabilities,
            unavailable: None,
            reported: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &BuiltInRegistry {
        &self.registry
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    pub fn recycle_bin(&self) -> &RecycleBin {
        &self.recycle_bin
    }

    /// Disables rendering for the rest of the engine's life. Every later
    /// frame is a no-op.
    pub fn set_context_unavailable(&mut self, error: &ShaderError) {
        log::error!("rendering disabled: {error}");
        self.unavailable = Some(error.to_string());
    }

    /// Why rendering is disabled, if it is.
    pub fn context_unavailable(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    pub fn add_component(&mut self, component: ShaderComponent) -> Result<(), EngineError> {
        if self.position(component.id()).is_some() {
            return Err(EngineError::DuplicateComponent(component.id().to_string()));
        }
        log::debug!("registered component {}", component.id());
        self.components.push(component);
        self.order.mark_dirty();
        Ok(())
    }

    /// Unregisters a component, queueing its GPU objects for deletion.
    pub fn remove_component(&mut self, id: &ComponentId) -> Result<ShaderComponent, EngineError> {
        let index = self
            .position(id)
            .ok_or_else(|| EngineError::UnknownComponent(id.to_string()))?;
        let mut component = self.components.remove(index);
        component.release(&mut self.recycle_bin);
        self.order.mark_dirty();
        Ok(component)
    }

    pub fn component(&self, id: &ComponentId) -> Option<&ShaderComponent> {
        self.components.iter().find(|c| c.id() == id)
    }

    /// Mutable access. The draw order is re-resolved afterwards since
    /// sampler references may change.
    pub fn component_mut(&mut self, id: &ComponentId) -> Option<&mut ShaderComponent> {
        self.order.mark_dirty();
        self.components.iter_mut().find(|c| c.id() == id)
    }

    pub fn components(&self) -> &[ShaderComponent] {
        &self.components
    }

    pub fn set_sort_order(&mut self, id: &ComponentId, sort_order: i32) -> Result<(), EngineError> {
        let index = self
            .position(id)
            .ok_or_else(|| EngineError::UnknownComponent(id.to_string()))?;
        if self.components[index].sort_order() != sort_order {
            self.components[index].set_sort_order(sort_order);
            self.order.mark_dirty();
        }
        Ok(())
    }

    /// Fills one iteration of a component's inputs.
    ///
    /// # Errors
    ///
    /// Fails for an unknown component, or once rendering is disabled since
    /// iteration 0 compiles the program.
    pub fn populate(
        &mut self,
        api: &dyn GraphicsApi,
        id: &ComponentId,
        iteration: usize,
        inputs: &[(String, Vec<InputValue>)],
    ) -> Result<(), EngineError> {
        let index = self
            .position(id)
            .ok_or_else(|| EngineError::UnknownComponent(id.to_string()))?;
        if let Some(reason) = &self.unavailable {
            return Err(EngineError::ContextUnavailable(reason.clone()));
        }
        let component = &mut self.components[index];
        let before = component.dependencies();
        component.populate(iteration, inputs, api, &mut self.recycle_bin);
        if component.dependencies() != before {
            self.order.mark_dirty();
        }
        Ok(())
    }

    /// The current draw order, re-sorted if anything affecting it changed.
    pub fn draw_order(&mut self) -> Vec<ComponentId> {
        let components = &self.components;
        self.order
            .order(|| {
                components
                    .iter()
                    .map(|c| DrawNode {
                        id: c.id().clone(),
                        sort_order: c.sort_order(),
                        consumes: c.dependencies(),
                    })
                    .collect()
            })
            .to_vec()
    }

    /// Draws every visible component for one view.
    pub fn draw_frame(&mut self, api: &dyn GraphicsApi, view: &ViewState) -> FrameReport {
        let mut report = FrameReport::default();
        if self.unavailable.is_some() {
            report.context_unavailable = true;
            return report;
        }

        let order = self.draw_order();
        let mut requirements = FrameRequirements::default();
        for component in self.components.iter().filter(|c| !c.hidden) {
            component.frame_requirements(&mut requirements);
        }

        let now = Instant::now();
        let time_delta = self.clock.tick(view.view_id, now);
        let mouse = self.mouse.update(&view.mouse, view.height as f32);
        let date = local_date();

        {
            let mut scope = self.frame_cache.begin_frame(
                api,
                &requirements,
                view.width,
                view.height,
                &mut self.recycle_bin,
            );
            for id in &order {
                let Some(component) = self
                    .components
                    .iter_mut()
                    .find(|c| c.id() == id && !c.hidden)
                else {
                    continue;
                };
                let (cache, bin) = scope.parts();
                let outcome = {
                    let mut ctx = SetupContext {
                        view,
                        mouse,
                        time: 0.0,
                        time_delta,
                        date,
                        capabilities: self.capabilities,
                        frame_cache: &*cache,
                        recycle_bin: &mut *bin,
                    };
                    component.draw(api, &self.registry, &mut ctx)
                };

                for (name, error) in outcome.builtin_errors {
                    if self.reported.insert(name) {
                        log::error!("built-in {name} failed: {error}");
                        report.builtin_errors.push(format!("{name}: {error}"));
                    }
                }
                if outcome.drawn {
                    report.drawn.push(id.to_string());
                    report.elements += outcome.elements;
                } else {
                    report.failed.push(id.to_string());
                }
                cache.store_outputs(api, id.as_str(), bin);
            }
        }

        report.recycled = self.recycle_bin.recycle(api);
        report
    }

    /// Every diagnostic of every component, keyed by component.
    pub fn diagnostics(&self) -> Vec<(ComponentId, ShaderError)> {
        self.components
            .iter()
            .flat_map(|c| {
                c.program()
                    .all_errors()
                    .into_iter()
                    .map(move |e| (c.id().clone(), e))
            })
            .collect()
    }

    /// Components referenced as texture producers that are not registered.
    pub fn missing_producers(&self) -> BTreeSet<ComponentId> {
        self.components
            .iter()
            .flat_map(|c| c.dependencies())
            .filter(|id| self.position(id).is_none())
            .collect()
    }

    /// Releases every component and deletes everything still queued.
    pub fn shutdown(&mut self, api: &dyn GraphicsApi) -> usize {
        for component in &mut self.components {
            component.release(&mut self.recycle_bin);
        }
        self.components.clear();
        self.frame_cache.end_frame(&mut self.recycle_bin);
        self.order.mark_dirty();
        self.recycle_bin.recycle(api)
    }

    fn position(&self, id: &ComponentId) -> Option<usize> {
        self.components.iter().position(|c| c.id() == id)
    }
}
