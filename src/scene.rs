//! Scene composition.
//!
//! A [`SceneComposer`] owns the renderable objects of one scene and drives
//! them through their lifecycle. What the scene contains and how it moves is
//! described by a [`SceneScript`]; the composer takes care of loading order,
//! the shared constant buffers and the two-pass reflection rendering.
//!
//! Logical initialization runs on tokio's blocking pool when a runtime is
//! available. Device work always happens on the caller's (render) thread.

use std::collections::HashSet;

use cgmath::Point3;
use futures::channel::oneshot;

use crate::{
    camera::{Camera, Projection},
    constants::{ConstantBindings, PerFrameConstants},
    data_structures::light::{DirectionalLight, Fog},
    error::LoadError,
    gpu::{GpuDevice, PassTarget},
    input::InputHandler,
    loader::{LoadChain, LoadState, LogicalObject, prepare_all},
    object::RenderableObject,
    pipelines::PipelineCache,
    reflection::{DEFAULT_CUBE_MAP_SIZE, DynamicCubeMap},
    resources::AssetRoot,
    sky::{SKY_OBJECT_NAME, follow_camera, sky_descriptor},
};

pub use crate::loader::{ObjectDescriptor, ObjectSource};

/// A dynamic reflection: `reflector` samples a cube rendered around `centre`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectionDescriptor {
    pub reflector: String,
    pub centre: Point3<f32>,
    pub size: u32,
}

impl ReflectionDescriptor {
    pub fn new(reflector: impl Into<String>, centre: Point3<f32>) -> Self {
        Self {
            reflector: reflector.into(),
            centre,
            size: DEFAULT_CUBE_MAP_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkyDescriptor {
    pub file: String,
    pub radius: f32,
}

/// Everything a scene is made of. Objects are loaded in the order given, the
/// sky after them and the reflection cube last.
#[derive(Clone, Debug)]
pub struct SceneBlueprint {
    pub objects: Vec<ObjectDescriptor>,
    pub sky: Option<SkyDescriptor>,
    pub reflection: Option<ReflectionDescriptor>,
    pub lights: [DirectionalLight; 3],
    pub fog: Fog,
    pub clear_colour: [f32; 4],
    pub camera: Camera,
}

impl Default for SceneBlueprint {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            sky: None,
            reflection: None,
            lights: [DirectionalLight::default(); 3],
            fog: Fog::default(),
            clear_colour: [0.1, 0.1, 0.1, 1.0],
            camera: Camera::look_at(Point3::new(0.0, 2.0, -15.0), Point3::new(0.0, 0.0, 0.0)),
        }
    }
}

/// What a script may touch while the scene runs.
pub struct SceneHandle<'a> {
    objects: &'a mut [RenderableObject],
    lights: &'a mut [DirectionalLight; 3],
    camera: &'a mut Camera,
    cube: Option<&'a mut DynamicCubeMap>,
}

impl SceneHandle<'_> {
    pub fn object(&mut self, name: &str) -> Option<&mut RenderableObject> {
        self.objects.iter_mut().find(|o| o.name() == name)
    }

    pub fn lights(&mut self) -> &mut [DirectionalLight; 3] {
        self.lights
    }

    pub fn camera(&mut self) -> &mut Camera {
        self.camera
    }

    pub fn set_reflection_centre(&mut self, centre: Point3<f32>) {
        if let Some(cube) = self.cube.as_deref_mut() {
            cube.set_centre(centre);
        }
    }
}

/// The content and behaviour of a scene.
pub trait SceneScript: Send {
    fn blueprint(&self) -> SceneBlueprint;

    /// Called once every object finished loading.
    fn on_ready(&mut self, _scene: &mut SceneHandle<'_>) {}

    /// Called every frame after loading completed, before the objects update.
    fn update(&mut self, _scene: &mut SceneHandle<'_>, _dt: f32, _total: f32) {}

    /// Scripts that react to input return their handler here.
    fn input(&mut self) -> Option<&mut dyn InputHandler> {
        None
    }
}

type Prepared = Vec<(String, Result<LogicalObject, LoadError>)>;

#[derive(Debug)]
struct PendingInit {
    generation: u64,
    receiver: oneshot::Receiver<(u64, Prepared)>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ChainItem {
    Object(usize),
    Cube,
}

pub struct SceneComposer {
    assets: AssetRoot,
    script: Box<dyn SceneScript>,
    generation: u64,
    pending: Option<PendingInit>,
    initialized: bool,
    objects: Vec<RenderableObject>,
    failures: Vec<(String, LoadError)>,
    broken: HashSet<usize>,
    sky: Option<usize>,
    reflector: Option<usize>,
    reflection: Option<ReflectionDescriptor>,
    cube: Option<DynamicCubeMap>,
    lights: [DirectionalLight; 3],
    fog: Fog,
    clear_colour: [f32; 4],
    clear_colour_override: Option<[f32; 4]>,
    cube_map_size: Option<u32>,
    camera: Camera,
    projection: Projection,
    bindings: ConstantBindings,
    pipelines: PipelineCache,
    chain: Option<LoadChain<ChainItem>>,
    /// Set by `create_device_dependent_resources`, cleared by `release`. A
    /// newer initialization starts loading its objects while this is set.
    device_requested: bool,
    /// Objects and cube of a superseded initialization, released once their
    /// uploads settled.
    retired: Vec<RenderableObject>,
    retired_cubes: Vec<DynamicCubeMap>,
    loading_complete: bool,
    elapsed: f32,
}

impl std::fmt::Debug for SceneComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneComposer")
            .field("generation", &self.generation)
            .field("initialized", &self.initialized)
            .field("objects", &self.objects.iter().map(|o| (o.name(), o.state())).collect::<Vec<_>>())
            .field("loading_complete", &self.loading_complete)
            .finish_non_exhaustive()
    }
}

impl SceneComposer {
    pub fn new(script: Box<dyn SceneScript>, assets: AssetRoot, width: u32, height: u32) -> Self {
        let blueprint = SceneBlueprint::default();
        Self {
            assets,
            script,
            generation: 0,
            pending: None,
            initialized: false,
            objects: Vec::new(),
            failures: Vec::new(),
            broken: HashSet::new(),
            sky: None,
            reflector: None,
            reflection: None,
            cube: None,
            lights: blueprint.lights,
            fog: blueprint.fog,
            clear_colour: blueprint.clear_colour,
            clear_colour_override: None,
            cube_map_size: None,
            camera: blueprint.camera,
            projection: Projection::new(width, height, cgmath::Deg(45.0), 1.0, 1000.0),
            bindings: ConstantBindings::new(),
            pipelines: PipelineCache::new(),
            chain: None,
            device_requested: false,
            retired: Vec::new(),
            retired_cubes: Vec::new(),
            loading_complete: false,
            elapsed: 0.0,
        }
    }

    /// Clears every pass with `colour` instead of the scene's own colour.
    pub fn with_clear_colour(mut self, colour: [f32; 4]) -> Self {
        self.clear_colour_override = Some(colour);
        self.clear_colour = colour;
        self
    }

    /// Overrides the edge length of the dynamic cube map.
    pub fn with_cube_map_size(mut self, size: u32) -> Self {
        self.cube_map_size = Some(size);
        self
    }

    /// Takes the scene-wide settings of the blueprint and returns the
    /// descriptors still to be prepared.
    fn begin_initialization(&mut self) -> (u64, Vec<ObjectDescriptor>) {
        self.generation += 1;
        self.initialized = false;
        self.loading_complete = false;

        let blueprint = self.script.blueprint();
        self.lights = blueprint.lights;
        self.fog = blueprint.fog;
        self.clear_colour = self.clear_colour_override.unwrap_or(blueprint.clear_colour);
        self.camera = blueprint.camera;
        self.reflection = blueprint.reflection;
        if let (Some(reflection), Some(size)) = (&mut self.reflection, self.cube_map_size) {
            reflection.size = size;
        }

        let mut descriptors = blueprint.objects;
        if let Some(sky) = blueprint.sky {
            descriptors.push(sky_descriptor(&sky.file, sky.radius));
        }
        (self.generation, descriptors)
    }

    /// Starts logical initialization in the background. Poll
    /// [`poll_initialization`](Self::poll_initialization) or await
    /// [`wait_for_initialization`](Self::wait_for_initialization) for the
    /// result. A new call supersedes a load still in progress; the old one
    /// runs to completion and is discarded.
    pub fn initialize(&mut self) {
        let (generation, descriptors) = self.begin_initialization();
        let assets = self.assets.clone();
        let (sender, receiver) = oneshot::channel();
        let work = move || {
            let prepared = prepare_all(&assets, descriptors);
            // The receiver is gone when this load was superseded.
            let _ = sender.send((generation, prepared));
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(work);
            }
            Err(_) => {
                log::debug!("no tokio runtime, preparing scene on a plain thread");
                std::thread::spawn(work);
            }
        }
        self.pending = Some(PendingInit { generation, receiver });
    }

    /// Logical initialization on the calling thread.
    pub fn initialize_blocking(&mut self) {
        let (generation, descriptors) = self.begin_initialization();
        self.pending = None;
        let prepared = prepare_all(&self.assets, descriptors);
        self.apply(generation, prepared);
    }

    /// Returns whether logical initialization completed, taking the
    /// background result if it arrived.
    pub fn poll_initialization(&mut self) -> bool {
        if let Some(pending) = &mut self.pending {
            match pending.receiver.try_recv() {
                Ok(Some((generation, prepared))) => {
                    self.pending = None;
                    self.apply(generation, prepared);
                }
                Ok(None) => {}
                Err(oneshot::Canceled) => {
                    log::error!("scene preparation stopped without a result");
                    self.pending = None;
                }
            }
        }
        self.initialized
    }

    pub async fn wait_for_initialization(&mut self) -> Result<(), LoadError> {
        if let Some(pending) = self.pending.take() {
            let (generation, prepared) = pending.receiver.await.map_err(|_| LoadError::Cancelled)?;
            self.apply(generation, prepared);
        }
        if self.initialized {
            Ok(())
        } else {
            Err(LoadError::Cancelled)
        }
    }

    fn apply(&mut self, generation: u64, prepared: Prepared) {
        if generation != self.generation {
            log::debug!("discarding superseded scene load {generation}");
            return;
        }
        self.retire();
        self.failures.clear();
        for (name, result) in prepared {
            match result {
                Ok(logical) => self.objects.push(RenderableObject::from_logical(logical)),
                Err(e) => self.failures.push((name, e)),
            }
        }
        self.sky = self.objects.iter().position(|o| o.name() == SKY_OBJECT_NAME);
        if let Some(reflection) = &self.reflection {
            match self.objects.iter().position(|o| o.name() == reflection.reflector) {
                Some(index) => {
                    self.reflector = Some(index);
                    self.cube = Some(DynamicCubeMap::new(reflection.size, reflection.centre));
                }
                None => log::warn!(
                    "reflecting object `{}` is not loaded, dynamic reflection disabled",
                    reflection.reflector
                ),
            }
        }
        self.initialized = true;
        log::info!(
            "scene initialized: {} objects, {} failed",
            self.objects.len(),
            self.failures.len()
        );
    }

    /// Moves the current objects and cube aside. The loading chain indexes
    /// into them, so it goes too.
    fn retire(&mut self) {
        if !self.objects.is_empty() {
            log::debug!("retiring {} objects of a superseded scene", self.objects.len());
        }
        self.retired.append(&mut self.objects);
        self.retired_cubes.extend(self.cube.take());
        self.reflector = None;
        self.sky = None;
        self.chain = None;
        self.broken.clear();
        self.loading_complete = false;
    }

    /// Releases retired objects whose uploads settled. Returns whether none
    /// are left; until then the pipelines they used stay alive.
    fn settle_retired(&mut self, device: &mut dyn GpuDevice) -> bool {
        if self.retired.is_empty() && self.retired_cubes.is_empty() {
            return true;
        }
        self.retired.retain_mut(|object| {
            if object.state() == LoadState::DeviceResourcesLoading
                && let Ok(false) = object.poll_loading(device)
            {
                return true;
            }
            object.release(device);
            false
        });
        self.retired_cubes.retain_mut(|cube| {
            if cube.texture().is_some()
                && !cube.is_ready()
                && let Ok(false) = cube.poll_loading()
            {
                return true;
            }
            cube.release(device);
            false
        });
        if !self.retired.is_empty() || !self.retired_cubes.is_empty() {
            return false;
        }
        self.pipelines.release(device);
        log::debug!("superseded scene resources released");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Starts creating device resources, one object after the other.
    pub fn create_device_dependent_resources(&mut self, device: &mut dyn GpuDevice) {
        if !self.initialized {
            log::warn!("scene components haven't been initialized, device resources not created");
            return;
        }
        self.device_requested = true;
        self.chain = None;
        self.loading_complete = false;
        self.poll_loading(device);
    }

    fn start_chain(&mut self, device: &mut dyn GpuDevice) {
        if !self.bindings.is_initialized() {
            self.bindings.initialize(device);
        }
        let order = (0..self.objects.len())
            .map(ChainItem::Object)
            .chain(self.cube.is_some().then_some(ChainItem::Cube));
        self.chain = Some(LoadChain::new(order));
    }

    /// Advances loading. Returns whether every loadable object is ready.
    ///
    /// Objects of a superseded initialization are released first; the new
    /// objects start loading only after that.
    pub fn poll_loading(&mut self, device: &mut dyn GpuDevice) -> bool {
        if !self.settle_retired(device) || !self.initialized {
            return false;
        }
        if self.loading_complete {
            return true;
        }
        if self.chain.is_none() {
            if !self.device_requested {
                return false;
            }
            self.start_chain(device);
        }
        let Some(chain) = &mut self.chain else {
            return false;
        };

        loop {
            if let Some(item) = chain.in_flight() {
                let settled = match item {
                    ChainItem::Object(i) if self.broken.contains(&i) => true,
                    ChainItem::Object(i) => match self.objects[i].poll_loading(device) {
                        Ok(ready) => ready,
                        Err(e) => {
                            log::error!("{}: {e}", self.objects[i].name());
                            self.broken.insert(i);
                            true
                        }
                    },
                    ChainItem::Cube => match self.cube.as_mut().map(DynamicCubeMap::poll_loading) {
                        Some(Ok(ready)) => ready,
                        Some(Err(e)) => {
                            log::error!("dynamic cube map: {e}");
                            self.cube = None;
                            self.reflector = None;
                            true
                        }
                        None => true,
                    },
                };
                if !settled {
                    return false;
                }
            }
            match chain.poll(|_| true) {
                Some(ChainItem::Object(i)) => {
                    if let Err(e) = self.objects[i].create_device_dependent_resources(device, &mut self.pipelines) {
                        log::error!("{}: {e}", self.objects[i].name());
                        self.broken.insert(i);
                    }
                }
                Some(ChainItem::Cube) => {
                    if let Some(cube) = &mut self.cube {
                        cube.create_device_dependent_resources(device);
                    }
                }
                None => break,
            }
        }

        self.loading_complete = self
            .objects
            .iter()
            .enumerate()
            .all(|(i, o)| self.broken.contains(&i) || o.is_ready());
        if self.loading_complete {
            log::info!("scene loading complete");
            let mut handle = SceneHandle {
                objects: &mut self.objects,
                lights: &mut self.lights,
                camera: &mut self.camera,
                cube: self.cube.as_mut(),
            };
            self.script.on_ready(&mut handle);
        }
        self.loading_complete
    }

    pub fn loading_complete(&self) -> bool {
        self.loading_complete
    }

    pub fn update(&mut self, dt: f32) {
        if !self.loading_complete {
            return;
        }
        self.elapsed += dt;
        let mut handle = SceneHandle {
            objects: &mut self.objects,
            lights: &mut self.lights,
            camera: &mut self.camera,
            cube: self.cube.as_mut(),
        };
        self.script.update(&mut handle, dt, self.elapsed);
        for object in &mut self.objects {
            object.update(dt);
        }
        if let Some(sky) = self.sky {
            follow_camera(&mut self.objects[sky], &self.camera);
        }
    }

    /// Records the frame: the cube faces around the reflector first (without
    /// the reflector itself), then the main pass with everything.
    pub fn render(&mut self, device: &mut dyn GpuDevice) {
        if !self.loading_complete {
            return;
        }
        self.bindings.begin_frame();

        if let (Some(cube), Some(reflector)) = (&self.cube, self.reflector)
            && cube.is_ready()
        {
            for face in 0..6 {
                let Some((camera, projection, target)) = cube.face(face) else {
                    break;
                };
                Self::render_pass(
                    device,
                    &mut self.bindings,
                    &mut self.objects,
                    PerFrameConstants::new(&camera, &projection, &self.lights, &self.fog),
                    target,
                    self.clear_colour,
                    Some(reflector),
                );
            }
            if let Some(texture) = cube.texture() {
                self.objects[reflector].update_reflect_map(texture);
            }
        }

        Self::render_pass(
            device,
            &mut self.bindings,
            &mut self.objects,
            PerFrameConstants::new(&self.camera, &self.projection, &self.lights, &self.fog),
            PassTarget::Frame,
            self.clear_colour,
            None,
        );
    }

    fn render_pass(
        device: &mut dyn GpuDevice,
        bindings: &mut ConstantBindings,
        objects: &mut [RenderableObject],
        frame: PerFrameConstants,
        target: PassTarget,
        clear_colour: [f32; 4],
        exclude: Option<usize>,
    ) {
        if bindings.push_frame(device, frame).is_none() {
            return;
        }
        device.begin_pass(target, Some(clear_colour));
        for (i, object) in objects.iter_mut().enumerate() {
            if Some(i) != exclude {
                object.render(device, bindings, None);
            }
        }
        device.end_pass();
    }

    /// Frees every device resource of the scene. Logical data is kept.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for mut object in self.retired.drain(..) {
            object.release(device);
        }
        for mut cube in self.retired_cubes.drain(..) {
            cube.release(device);
        }
        for object in &mut self.objects {
            object.release(device);
        }
        if let Some(cube) = &mut self.cube {
            cube.release(device);
        }
        self.bindings.release(device);
        self.pipelines.release(device);
        self.chain = None;
        self.device_requested = false;
        self.broken.clear();
        self.loading_complete = false;
    }

    /// Rebuilds device resources after a device loss or an explicit release.
    pub fn recreate_device_resources(&mut self, device: &mut dyn GpuDevice) {
        log::info!("recreating device resources");
        self.release(device);
        self.create_device_dependent_resources(device);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
    }

    pub fn object(&self, name: &str) -> Option<&RenderableObject> {
        self.objects.iter().find(|o| o.name() == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut RenderableObject> {
        self.objects.iter_mut().find(|o| o.name() == name)
    }

    pub fn objects(&self) -> &[RenderableObject] {
        &self.objects
    }

    /// Objects that failed logical initialization, with the reason.
    pub fn failures(&self) -> &[(String, LoadError)] {
        &self.failures
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn lights(&self) -> &[DirectionalLight; 3] {
        &self.lights
    }

    pub fn cube_map(&self) -> Option<&DynamicCubeMap> {
        self.cube.as_ref()
    }

    pub fn input(&mut self) -> Option<&mut dyn InputHandler> {
        self.script.input()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
