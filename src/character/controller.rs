use tracing::debug;

use crate::collision::BodyHandle;
use crate::dynamics::{RigidBody, RigidBodyDesc};
use crate::error::{PhysicsError, Result};
use crate::geometry::{Ray, Shape};
use crate::math::Vec3;
use crate::world::{RaycastHit, World};

use super::{CharacterConfig, CharacterState};

/// Horizontal offset of the four perimeter ground rays, relative to the radius
const PERIMETER_RAY_FACTOR: f32 = 0.7;
/// Side offset of the extra sweep rays, relative to the capsule width
const LATERAL_RAY_FACTOR: f32 = 0.7;
/// Slopes below this angle (about 5 degrees) count as flat ground
const FLAT_GROUND_ANGLE: f32 = 0.087;
/// Ground speed above which the ground counts as a moving platform
const PLATFORM_SPEED_EPSILON: f32 = 0.01;
/// Surfaces with a flatter normal than this are never ground
const MIN_GROUND_NORMAL_Y: f32 = 0.2;
const MAX_SLIDE_ITERATIONS: usize = 4;
const MIN_MOVE_DISTANCE: f32 = 1e-5;

/// The surface found below the character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundHit {
    pub body: BodyHandle,
    pub point: Vec3,
    pub normal: Vec3,
    /// Vertical gap between the capsule and the surface, negative when sunk in
    pub gap: f32,
}

impl GroundHit {
    /// Angle between the surface normal and world up, in radians
    #[inline]
    pub fn slope_angle(&self) -> f32 {
        self.normal.y.clamp(-1.0, 1.0).acos()
    }
}

/// Closest obstruction met by a horizontal sweep
#[derive(Debug, Clone, Copy)]
struct SweepHit {
    /// Distance the capsule can travel before touching
    travel: f32,
    point: Vec3,
    normal: Vec3,
}

/// Moves a capsule body with sweeps and raycasts instead of forces.
///
/// The body stays a dynamic body so other bodies collide with it, but it
/// ignores world gravity and never rotates. The controller owns the
/// vertical velocity and applies its own gravity after resolving movement.
#[derive(Debug, Clone)]
pub struct CharacterController {
    body: BodyHandle,
    config: CharacterConfig,
    state: CharacterState,
    ground: Option<GroundHit>,
    /// Velocity owned by the controller (gravity, jumps, knockback)
    velocity: Vec3,
    /// Velocity inherited from a moving platform
    external_velocity: Vec3,
}

impl CharacterController {
    /// Creates a capsule body at `position` and attaches a controller to it
    pub fn new(world: &mut World, position: Vec3, config: CharacterConfig) -> Self {
        let desc = RigidBodyDesc::dynamic()
            .with_position(position)
            .with_shape(config.shape())
            .with_mass(config.mass)
            .with_friction(0.0)
            .with_restitution(0.0)
            .with_gravity_scale(0.0)
            .with_can_sleep(false)
            .with_lock_rotation(true);
        let body = world.add_rigid_body(desc);
        debug!(?body, "created character controller");
        Self::attached(body, config)
    }

    /// Attaches a controller to an existing capsule body. The capsule's
    /// dimensions replace the ones in `config`.
    pub fn from_body(world: &mut World, body: BodyHandle, mut config: CharacterConfig) -> Result<Self> {
        let rigid_body = world.body_mut(body).ok_or(PhysicsError::InvalidBody(body))?;
        let Some(Shape::Capsule(capsule)) = rigid_body.shape().copied() else {
            return Err(PhysicsError::NotACapsule(body));
        };

        config.radius = capsule.radius;
        config.height = capsule.total_height();
        rigid_body.gravity_scale = 0.0;
        rigid_body.can_sleep = false;
        rigid_body.set_lock_rotation(true);
        rigid_body.wake_up();
        Ok(Self::attached(body, config))
    }

    fn attached(body: BodyHandle, config: CharacterConfig) -> Self {
        Self {
            body,
            config,
            state: CharacterState::Airborne,
            ground: None,
            velocity: Vec3::ZERO,
            external_velocity: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    #[inline]
    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> CharacterState {
        self.state
    }

    /// Ground found by the last move, if any
    #[inline]
    pub fn ground(&self) -> Option<GroundHit> {
        self.ground
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    #[inline]
    pub fn external_velocity(&self) -> Vec3 {
        self.external_velocity
    }

    pub fn position(&self, world: &World) -> Option<Vec3> {
        world.body(self.body).map(RigidBody::position)
    }

    /// True when standing on walkable ground
    pub fn is_grounded(&self) -> bool {
        self.state != CharacterState::Airborne && self.ground.is_some_and(|g| self.is_walkable(g.normal))
    }

    /// True when standing on a slope too steep to walk
    pub fn is_sliding(&self) -> bool {
        self.state == CharacterState::OnSlope && !self.is_grounded()
    }

    /// Adds to the controller's own velocity, e.g. for knockback
    pub fn add_velocity(&mut self, velocity: Vec3) {
        self.velocity += velocity;
    }

    /// Launches the character upward. Only works when grounded.
    pub fn jump(&mut self, speed: f32) -> bool {
        if !self.is_grounded() || !(speed > 0.0) {
            return false;
        }
        self.velocity.y = speed;
        self.ground = None;
        self.state = CharacterState::Airborne;
        true
    }

    /// Moves the character by `displacement` over `dt` seconds.
    ///
    /// The horizontal part is swept against the world, sliding along walls,
    /// stepping onto low ledges and following walkable slopes. The vertical
    /// part, gravity and ground friction are resolved afterwards.
    pub fn move_character(&mut self, world: &mut World, displacement: Vec3, dt: f32) -> Result<()> {
        let mut position = self.position(world).ok_or(PhysicsError::InvalidBody(self.body))?;
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.refresh_ground(world, position);
        self.update_platform_velocity(world, dt);

        let motion = self.planar_motion(displacement, dt);
        position = self.slide(world, position, motion);
        position = self.resolve_vertical(world, position, displacement.y, dt);

        world.set_position(self.body, position);
        world.set_linear_velocity(self.body, Vec3::ZERO);
        self.refresh_ground(world, position);

        if self.is_grounded() {
            let keep = (1.0 - self.config.ground_friction * dt).max(0.0);
            self.velocity.x *= keep;
            self.velocity.z *= keep;
        }
        Ok(())
    }

    fn is_walkable(&self, normal: Vec3) -> bool {
        normal.y >= self.config.min_walkable_normal_y()
    }

    fn cast(&self, world: &World, ray: &Ray) -> Option<RaycastHit> {
        let own = self.body;
        world.raycast_filtered(ray, |body| body.handle() != own)
    }

    fn refresh_ground(&mut self, world: &World, position: Vec3) {
        // Rising under our own velocity means we just left the ground
        self.ground = if self.velocity.y > 0.0 {
            None
        } else {
            self.probe_ground(world, position, self.config.ground_check_distance)
        };

        self.state = match self.ground {
            None => CharacterState::Airborne,
            Some(ground) => {
                let moving = world.body(ground.body).is_some_and(|b| {
                    !b.is_static() && b.velocity_at_point(ground.point).length() > PLATFORM_SPEED_EPSILON
                });
                if moving {
                    CharacterState::OnMovingPlatform
                } else if ground.slope_angle() > FLAT_GROUND_ANGLE {
                    CharacterState::OnSlope
                } else {
                    CharacterState::Grounded
                }
            }
        };
    }

    /// Casts five rays down from the bottom cap center (one on the axis,
    /// four around the perimeter) and returns the ground within `reach`.
    /// The axis ray wins whenever it hits.
    fn probe_ground(&self, world: &World, position: Vec3, reach: f32) -> Option<GroundHit> {
        let r = self.config.radius;
        let origin = position - Vec3::Y * self.config.half_segment();
        let o = r * PERIMETER_RAY_FACTOR;
        let offsets = [Vec3::ZERO, Vec3::X * o, -Vec3::X * o, Vec3::Z * o, -Vec3::Z * o];
        let max_distance = r / MIN_GROUND_NORMAL_Y + reach.max(0.0);

        let mut best: Option<GroundHit> = None;
        for (i, offset) in offsets.into_iter().enumerate() {
            let Some(hit) = self.cast(world, &Ray::new(origin + offset, -Vec3::Y, max_distance)) else {
                continue;
            };
            if hit.normal.y < MIN_GROUND_NORMAL_Y {
                continue;
            }

            // A sphere resting on a plane sits r / n.y above it vertically
            let gap = hit.distance - r / hit.normal.y;
            if gap > reach {
                continue;
            }

            let candidate = GroundHit {
                body: hit.body,
                point: hit.point,
                normal: hit.normal,
                gap,
            };
            if i == 0 {
                return Some(candidate);
            }
            if best.map_or(true, |b| gap < b.gap) {
                best = Some(candidate);
            }
        }
        best
    }

    fn update_platform_velocity(&mut self, world: &World, dt: f32) {
        if self.state == CharacterState::OnMovingPlatform {
            let platform = self
                .ground
                .and_then(|g| world.body(g.body).map(|b| b.velocity_at_point(g.point)));
            if let Some(velocity) = platform {
                self.external_velocity = velocity;
                return;
            }
        }

        self.external_velocity *= (-self.config.platform_decay.max(0.0) * dt).exp();
        if self.external_velocity.length_squared() < PLATFORM_SPEED_EPSILON * PLATFORM_SPEED_EPSILON {
            self.external_velocity = Vec3::ZERO;
        }
    }

    /// Horizontal motion for this move, bent onto walkable slopes and
    /// turned into a downhill slide on steep ones
    fn planar_motion(&self, displacement: Vec3, dt: f32) -> Vec3 {
        let carried = self.velocity + self.external_velocity;
        let mut motion = Vec3::new(displacement.x + carried.x * dt, 0.0, displacement.z + carried.z * dt);

        let Some(ground) = self.ground else {
            return motion;
        };

        if self.is_walkable(ground.normal) {
            if ground.slope_angle() > FLAT_GROUND_ANGLE {
                let length = motion.length();
                if let Some(dir) = motion.project_on_plane(ground.normal).try_normalize() {
                    motion = dir * length;
                }
            }
            return motion;
        }

        let downhill = Vec3::new(ground.normal.x, 0.0, ground.normal.z).normalize_or(Vec3::ZERO);
        let along = motion.dot(downhill);
        if along < 0.0 {
            motion -= downhill * along;
        }
        let slide = (-Vec3::Y).project_on_plane(ground.normal).normalize_or(downhill);
        motion + slide * (self.config.slide_speed * dt)
    }

    /// Sweeps `motion` through the world, sliding along what it hits
    fn slide(&self, world: &World, mut position: Vec3, motion: Vec3) -> Vec3 {
        let skin = self.config.skin_width;
        let mut remaining = motion;

        for _ in 0..MAX_SLIDE_ITERATIONS {
            let Some((dir, distance)) = remaining.normalize_with_length() else {
                break;
            };
            if distance < MIN_MOVE_DISTANCE {
                break;
            }

            let Some(hit) = self.sweep(world, position, dir, distance + skin) else {
                position += remaining;
                break;
            };

            let travel = (hit.travel - skin).clamp(0.0, distance);
            position += dir * travel;
            let rest = distance - travel;

            if let Some(ledge) = self.can_step_up(world, position, dir, &hit) {
                if let Some(stepped) = self.try_step_up(world, position, dir, rest, ledge) {
                    return stepped;
                }
            }

            // Walls slide horizontally; walkable surfaces are climbed
            let plane = if self.is_walkable(hit.normal) {
                hit.normal
            } else {
                Vec3::new(hit.normal.x, 0.0, hit.normal.z).normalize_or(hit.normal)
            };
            remaining = (dir * rest).project_on_plane(plane);
        }
        position
    }

    /// Half the capsule's width at `height` above its center
    fn half_width_at(&self, height: f32) -> f32 {
        let r = self.config.radius;
        let over = (height.abs() - self.config.half_segment()).max(0.0);
        (r * r - over * over).max(0.0).sqrt()
    }

    /// Casts rays along `dir` at several heights of the capsule and returns
    /// the hit that allows the shortest travel
    fn sweep(&self, world: &World, position: Vec3, dir: Vec3, distance: f32) -> Option<SweepHit> {
        let half_height = self.config.half_height();
        let heights = [
            -half_height + self.config.skin_width * 2.0,
            -half_height + self.config.radius,
            0.0,
            self.config.half_segment(),
        ];
        let side = dir.cross(Vec3::Y).try_normalize();

        let mut best: Option<SweepHit> = None;
        for height in heights {
            let width = self.half_width_at(height);
            for lateral in [0.0, width * LATERAL_RAY_FACTOR, -width * LATERAL_RAY_FACTOR] {
                let offset = match side {
                    Some(side) => side * lateral,
                    None if lateral == 0.0 => Vec3::ZERO,
                    None => continue,
                };
                let reach = (width * width - lateral * lateral).max(0.0).sqrt();
                let ray = Ray::new(position + Vec3::Y * height + offset, dir, reach + distance);
                let Some(hit) = self.cast(world, &ray) else {
                    continue;
                };

                let travel = hit.distance - reach;
                if best.map_or(true, |b| travel < b.travel) {
                    best = Some(SweepHit {
                        travel,
                        point: hit.point,
                        normal: hit.normal,
                    });
                }
            }
        }
        best
    }

    /// Height of the ledge behind `hit` if it is low enough to climb and
    /// has a walkable top
    fn can_step_up(&self, world: &World, position: Vec3, dir: Vec3, hit: &SweepHit) -> Option<f32> {
        if !self.is_grounded() || self.is_walkable(hit.normal) {
            return None;
        }

        let feet = position.y - self.config.half_height();
        let step = self.config.step_height;
        if hit.point.y - feet > step {
            return None;
        }

        let forward = Vec3::new(dir.x, 0.0, dir.z).try_normalize()?;
        let skin = self.config.skin_width;
        let origin = Vec3::new(hit.point.x, feet + step + skin, hit.point.z) + forward * (skin * 2.0);
        let top = self.cast(world, &Ray::new(origin, -Vec3::Y, step + skin))?;

        let height = top.point.y - feet;
        (self.is_walkable(top.normal) && height > MIN_MOVE_DISTANCE && height <= step).then_some(height)
    }

    /// Up, across, then down onto the ledge. Returns `None` (leaving the
    /// character where it was) if any leg is blocked.
    fn try_step_up(&self, world: &World, position: Vec3, dir: Vec3, rest: f32, ledge_height: f32) -> Option<Vec3> {
        let skin = self.config.skin_width;
        let lift = ledge_height + skin;

        let head = position + Vec3::Y * self.config.half_segment();
        if self.cast(world, &Ray::new(head, Vec3::Y, self.config.radius + lift)).is_some() {
            return None;
        }
        let raised = position + Vec3::Y * lift;

        let forward = Vec3::new(dir.x, 0.0, dir.z).try_normalize()?;
        let wanted = rest.max(self.config.radius);
        let across = match self.sweep(world, raised, forward, wanted + skin) {
            Some(hit) => (hit.travel - skin).clamp(0.0, wanted),
            None => wanted,
        };
        if across < skin {
            return None;
        }
        let moved = raised + forward * across;

        let ground = self.probe_ground(world, moved, lift + self.config.ground_check_distance)?;
        self.is_walkable(ground.normal).then(|| moved - Vec3::Y * ground.gap)
    }

    /// Applies vertical input, platform motion and gravity. Grounded
    /// characters snap down onto the ground; airborne ones land or bump
    /// their head.
    fn resolve_vertical(&mut self, world: &World, mut position: Vec3, rise: f32, dt: f32) -> Vec3 {
        if self.is_grounded() && self.velocity.y <= 0.0 {
            self.velocity.y = 0.0;
            position.y += rise + self.external_velocity.y * dt;

            if rise <= 0.0 {
                let reach = self.config.step_height + self.config.ground_check_distance;
                if let Some(ground) = self.probe_ground(world, position, reach) {
                    if self.is_walkable(ground.normal) {
                        position.y -= ground.gap;
                    }
                }
            }
            return position;
        }

        self.velocity.y -= self.config.gravity * dt;
        let dy = rise + (self.velocity.y + self.external_velocity.y) * dt;

        if dy < 0.0 {
            if let Some(ground) = self.probe_ground(world, position, -dy) {
                position.y -= ground.gap;
                self.velocity.y = 0.0;
                return position;
            }
        } else if dy > 0.0 {
            let head = position + Vec3::Y * self.config.half_segment();
            if let Some(hit) = self.cast(world, &Ray::new(head, Vec3::Y, self.config.radius + dy)) {
                position.y += (hit.distance - self.config.radius - self.config.skin_width).clamp(0.0, dy);
                self.velocity.y = self.velocity.y.min(0.0);
                return position;
            }
        }

        position.y += dy;
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f32 = 1.0 / 60.0;

    /// Static floor whose top face is at y = 0
    fn floor(world: &mut World) -> BodyHandle {
        world.add_rigid_body(
            RigidBodyDesc::fixed()
                .with_shape(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0)))
                .with_position(Vec3::new(0.0, -0.5, 0.0)),
        )
    }

    /// Controller standing with its feet at y = 0
    fn standing(world: &mut World) -> CharacterController {
        CharacterController::new(world, Vec3::new(0.0, 0.9, 0.0), CharacterConfig::default())
    }

    #[test]
    fn test_grounded_on_flat_floor() {
        let mut world = World::default();
        floor(&mut world);
        let mut character = standing(&mut world);

        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();

        assert_eq!(character.state(), CharacterState::Grounded);
        assert!(character.is_grounded());
        assert_abs_diff_eq!(character.position(&world).unwrap().y, 0.9, epsilon = 1e-4);
    }

    #[test]
    fn test_airborne_after_floor_removed() {
        let mut world = World::default();
        let floor = floor(&mut world);
        let mut character = standing(&mut world);
        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();
        assert!(character.is_grounded());

        world.remove_rigid_body(floor);
        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();

        assert_eq!(character.state(), CharacterState::Airborne);
        assert!(!character.is_grounded());
        assert!(character.position(&world).unwrap().y < 0.9);
    }

    #[test]
    fn test_wall_blocks_movement() {
        let mut world = World::default();
        floor(&mut world);
        world.add_rigid_body(
            RigidBodyDesc::fixed()
                .with_shape(Shape::cuboid(Vec3::new(0.5, 2.0, 5.0)))
                .with_position(Vec3::new(2.0, 1.5, 0.0)),
        );
        let mut character = standing(&mut world);

        for _ in 0..60 {
            character.move_character(&mut world, Vec3::new(0.1, 0.0, 0.0), DT).unwrap();
        }

        // Wall face at x = 1.5, radius 0.4, skin 0.02
        let position = character.position(&world).unwrap();
        assert_abs_diff_eq!(position.x, 1.08, epsilon = 1e-3);
        assert_abs_diff_eq!(position.z, 0.0, epsilon = 1e-4);
        assert!(character.is_grounded());
    }

    #[test]
    fn test_steps_onto_low_ledge() {
        let mut world = World::default();
        floor(&mut world);
        world.add_rigid_body(
            RigidBodyDesc::fixed()
                .with_shape(Shape::cuboid(Vec3::new(3.0, 0.1, 2.0)))
                .with_position(Vec3::new(5.0, 0.1, 0.0)),
        );
        let mut character = standing(&mut world);

        for _ in 0..80 {
            character.move_character(&mut world, Vec3::new(0.05, 0.0, 0.0), DT).unwrap();
        }

        // Feet end on the ledge top at y = 0.2
        let position = character.position(&world).unwrap();
        assert!(position.x > 2.5, "x = {}", position.x);
        assert_abs_diff_eq!(position.y, 1.1, epsilon = 1e-3);
        assert!(character.is_grounded());
    }

    #[test]
    fn test_jump_and_land() {
        let mut world = World::default();
        floor(&mut world);
        let mut character = standing(&mut world);
        assert!(!character.jump(5.0));

        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();
        assert!(character.jump(5.0));
        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();

        assert_eq!(character.state(), CharacterState::Airborne);
        assert!(character.position(&world).unwrap().y > 0.9);
        assert!(!character.jump(5.0));

        for _ in 0..120 {
            character.move_character(&mut world, Vec3::ZERO, DT).unwrap();
        }
        assert_eq!(character.state(), CharacterState::Grounded);
        assert_abs_diff_eq!(character.position(&world).unwrap().y, 0.9, epsilon = 1e-3);
    }

    #[test]
    fn test_moving_platform_carries_then_decays() {
        let mut world = World::default();
        let platform = world.add_rigid_body(
            RigidBodyDesc::kinematic()
                .with_shape(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
                .with_position(Vec3::new(0.0, -0.5, 0.0))
                .with_linear_velocity(Vec3::X),
        );
        let mut character = standing(&mut world);

        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();
        assert_eq!(character.state(), CharacterState::OnMovingPlatform);
        assert!(character.is_grounded());
        assert_abs_diff_eq!(character.external_velocity().x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(character.position(&world).unwrap().x, DT, epsilon = 1e-5);

        world.remove_rigid_body(platform);
        character.move_character(&mut world, Vec3::ZERO, DT).unwrap();
        let carried = character.external_velocity().x;
        assert!(carried > 0.5 && carried < 1.0, "carried = {carried}");
    }

    #[test]
    fn test_slope_motion() {
        let mut world = World::default();
        let mut character = standing(&mut world);
        let ground = |normal: Vec3| GroundHit {
            body: BodyHandle::INVALID,
            point: Vec3::ZERO,
            normal,
            gap: 0.0,
        };

        // 30 degrees: walkable, uphill input climbs along the plane
        character.ground = Some(ground(Vec3::new(0.5, 0.75_f32.sqrt(), 0.0)));
        character.state = CharacterState::OnSlope;
        assert!(character.is_grounded());
        let motion = character.planar_motion(Vec3::new(-1.0, 0.0, 0.0), DT);
        assert_abs_diff_eq!(motion.length(), 1.0, epsilon = 1e-5);
        assert!(motion.y > 0.0);

        // 60 degrees: uphill input is dropped and the slide pulls downhill
        character.ground = Some(ground(Vec3::new(0.75_f32.sqrt(), 0.5, 0.0)));
        assert!(character.is_sliding());
        let motion = character.planar_motion(Vec3::new(-1.0, 0.0, 0.0), DT);
        assert!(motion.x > 0.0);
        assert!(motion.y < 0.0);
        assert_abs_diff_eq!(motion.length(), character.config().slide_speed * DT, epsilon = 1e-5);
    }

    #[test]
    fn test_from_body_requires_capsule() {
        let mut world = World::default();
        let sphere = world.add_rigid_body(RigidBodyDesc::dynamic().with_shape(Shape::sphere(0.5)));
        assert_eq!(
            CharacterController::from_body(&mut world, sphere, CharacterConfig::default()).unwrap_err(),
            PhysicsError::NotACapsule(sphere)
        );

        let capsule = world.add_rigid_body(RigidBodyDesc::dynamic().with_shape(Shape::capsule(0.3, 1.0)));
        let character = CharacterController::from_body(&mut world, capsule, CharacterConfig::default()).unwrap();
        assert_abs_diff_eq!(character.config().height, 1.6, epsilon = 1e-5);
        assert_eq!(world.body(capsule).unwrap().gravity_scale, 0.0);

        world.remove_rigid_body(capsule);
        assert_eq!(
            CharacterController::from_body(&mut world, capsule, CharacterConfig::default()).unwrap_err(),
            PhysicsError::InvalidBody(capsule)
        );
    }
}
