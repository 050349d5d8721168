//! Per-frame simulation tick
//!
//! Advances one level by an externally supplied delta. Stages run in a fixed
//! order; a stage that ends the level stops the rest of the frame.

use glam::Vec2;
use std::f32::consts::FRAC_PI_2;

use super::candy::{CandyTopology, Side, candy_bounds};
use super::cut::nearest_segment;
use super::grab::SpiderEvent;
use super::hazard::RocketState;
use super::pickup::{BubbleState, buoyancy_impulse};
use super::point::{ConstraintKind, PointId};
use super::rope::STRAIN_SLACK;
use super::state::{AnimationCue, CandyLoss, Phase, STAR_FADE_TIME, Scene, SimEvent, piece_bounds};
use super::timer::{DelayedAction, TimerOwner};
use crate::audio::SoundEffect;
use crate::consts::*;
use crate::normalize_angle;

/// Snapshot of a live candy piece, taken so systems can mutate the scene freely
#[derive(Debug, Clone, Copy)]
struct Piece {
    side: Side,
    point: PointId,
    radius: f32,
    in_sock: bool,
}

fn pieces(scene: &Scene) -> Vec<Piece> {
    scene
        .candy
        .pieces()
        .into_iter()
        .map(|(side, c)| Piece {
            side,
            point: c.point,
            radius: c.radius,
            in_sock: c.in_sock,
        })
        .collect()
}

/// Advance the scene by `dt` seconds
pub fn tick(scene: &mut Scene, dt: f32) {
    if dt <= 0.0 {
        return;
    }
    scene.frame_dt = dt;
    scene.time += dt;

    for (owner, action) in scene.timers.advance(dt) {
        scene.run_delayed(owner, action);
    }
    update_particles(scene, dt);
    update_star_fades(scene, dt);

    // Physics keeps running after the outcome so cut ropes finish falling
    update_grabs(scene, dt);
    let gravity = scene.gravity();
    scene
        .points
        .integrate_all(dt, gravity, scene.settings.damping);
    update_ropes(scene, dt);

    if scene.phase != Phase::Playing {
        return;
    }
    update_spiders(scene, dt);
    auto_attach(scene);
    choose_rotation_ropes(scene);
    update_merge(scene, dt);
    collect_stars(scene, dt);
    update_bubbles(scene, dt);
    update_hazards(scene, dt);
    update_target(scene, dt);
    if scene.phase != Phase::Playing {
        return;
    }
    check_offscreen(scene);
    check_rope_free(scene, dt);
    update_highlight(scene);
}

fn update_particles(scene: &mut Scene, dt: f32) {
    let gravity = scene.gravity();
    for p in &mut scene.particles {
        p.vel += gravity * dt;
        p.pos += p.vel * dt;
        p.life -= dt * 1.5;
    }
    scene.particles.retain(|p| p.life > 0.0);
}

fn update_star_fades(scene: &mut Scene, dt: f32) {
    for left in scene.star_fades.values_mut() {
        *left -= dt;
    }
    scene.star_fades.retain(|_, left| *left > 0.0);
}

/// Move grabs along their paths; rope anchors follow
fn update_grabs(scene: &mut Scene, dt: f32) {
    for grab in &mut scene.grabs {
        grab.update_position(dt);
        if let Some(rope) = &grab.rope {
            rope.set_anchor(&mut scene.points, grab.pos);
        }
    }
}

/// Relax every rope and remove the ones whose cut has run out
fn update_ropes(scene: &mut Scene, dt: f32) {
    let delta = dt * scene.settings.rope_physics_speed;
    let iterations = scene.settings.relaxation_iterations;
    for grab in &mut scene.grabs {
        let finished = match &mut grab.rope {
            Some(rope) => {
                rope.update(&mut scene.points, delta, iterations);
                rope.is_finished()
            }
            None => false,
        };
        if finished {
            if let Some(rope) = grab.rope.take() {
                rope.destroy(&mut scene.points);
            }
        }
    }
}

fn update_spiders(scene: &mut Scene, dt: f32) {
    let mut stolen = Vec::new();
    for gi in 0..scene.grabs.len() {
        let Some(event) = scene.grabs[gi].update_spider(&scene.points, dt) else {
            continue;
        };
        let grab_id = scene.grabs[gi].id;
        match event {
            SpiderEvent::Woke => scene.play(SoundEffect::SpiderActivate),
            SpiderEvent::Fell => {
                scene.play(SoundEffect::SpiderFall);
                scene.emit(SimEvent::Animation(AnimationCue::SpiderBusted { grab: grab_id }));
            }
            SpiderEvent::Arrived => {
                scene.play(SoundEffect::SpiderWin);
                let tail = scene.grabs[gi].rope.as_ref().map(|r| r.tail());
                if let Some(side) = tail.and_then(|t| scene.candy.side_of(t)) {
                    stolen.push(side);
                }
            }
        }
    }
    for side in stolen {
        scene.destroy_candy(side, CandyLoss::Stolen);
    }
}

/// Grabs with a trigger radius tie a new rope when the candy comes close
///
/// A grab re-arms only after the candy has left its radius, so a candy
/// resting inside it after a cut is not caught again. Leaving re-arms it
/// even while the cut rope is still fading.
fn auto_attach(scene: &mut Scene) {
    let live = pieces(scene);
    for gi in 0..scene.grabs.len() {
        let grab = &scene.grabs[gi];
        let Some(radius) = grab.radius else {
            continue;
        };
        let nearest = live
            .iter()
            .filter(|p| !p.in_sock)
            .filter(|p| grab.part.is_none_or(|part| part == p.side || p.side == Side::Whole))
            .filter_map(|p| Some((*p, scene.points.pos(p.point)?.distance(grab.pos))))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let Some((piece, distance)) = nearest else {
            continue;
        };

        if distance >= radius + piece.radius {
            scene.grabs[gi].armed = true;
            continue;
        }
        // A rope that is still fading out after a cut keeps the grab busy
        if !grab.armed || grab.rope.is_some() {
            continue;
        }

        let length = grab.length.unwrap_or(distance);
        let grab = &mut scene.grabs[gi];
        grab.attach(&mut scene.points, piece.point, length);
        let grab_id = grab.id;
        scene.attach_count += 1;
        log::debug!("Grab {} attached to candy {:?}", grab_id, piece.side);
        scene.play(SoundEffect::RopeAttach);
        scene.emit(SimEvent::RopeAttached { grab: grab_id });
    }
}

/// The first taut rope on each piece drives its rotation
fn choose_rotation_ropes(scene: &mut Scene) {
    for grab in &mut scene.grabs {
        if let Some(rope) = &mut grab.rope {
            rope.chosen_one = false;
        }
    }
    for piece in pieces(scene) {
        let chosen = scene.grabs.iter().position(|g| {
            g.rope
                .as_ref()
                .is_some_and(|r| !r.is_cut() && r.tail() == piece.point && r.relaxed != STRAIN_SLACK)
        });
        let Some(gi) = chosen else {
            continue;
        };
        let Some(rope) = scene.grabs[gi].rope.as_mut() else {
            continue;
        };
        rope.chosen_one = true;
        let angle = rope.tail_angle(&scene.points);
        if let (Some(angle), Some(candy)) = (angle, scene.candy.get_mut(piece.side)) {
            candy.rotation = normalize_angle(angle + FRAC_PI_2);
        }
    }
}

/// Two-part candy: start closing once the halves touch, merge when closed
fn update_merge(scene: &mut Scene, dt: f32) {
    let (left, right, closing) = match &scene.candy {
        CandyTopology::Separate { left, right } => {
            ((left.point, left.radius), (right.point, right.radius), false)
        }
        CandyTopology::Closing { left, right, .. } => {
            ((left.point, left.radius), (right.point, right.radius), true)
        }
        _ => return,
    };
    let (Some(lp), Some(rp)) = (scene.points.pos(left.0), scene.points.pos(right.0)) else {
        return;
    };

    if !closing {
        if candy_bounds(lp, left.1).overlaps(&candy_bounds(rp, right.1)) {
            let distance = lp.distance(rp);
            scene
                .points
                .link(left.0, right.0, distance, ConstraintKind::NotMoreThan);
            scene
                .candy
                .begin_merge(distance, scene.settings.merge_duration);
            log::debug!("Candy halves closing from {:.1}px", distance);
        }
        return;
    }

    let Some(merge) = scene.candy.merge_progress_mut() else {
        return;
    };
    merge.elapsed += dt;
    let target = merge.target_distance();
    let complete = merge.is_complete();
    for (a, b) in [(left.0, right.0), (right.0, left.0)] {
        if let Some(p) = scene.points.get_mut(a) {
            p.change_rest_length(b, target);
        }
    }
    for _ in 0..scene.settings.relaxation_iterations {
        scene.points.satisfy(left.0);
        scene.points.satisfy(right.0);
    }
    if complete {
        finish_merge(scene, left.0, right.0);
    }
}

fn finish_merge(scene: &mut Scene, left: PointId, right: PointId) {
    let (Some(lp), Some(rp)) = (scene.points.pos(left), scene.points.pos(right)) else {
        return;
    };
    // A half waiting in a sock holds the merged candy there
    let sock_pin = [left, right]
        .iter()
        .find_map(|id| scene.points.get(*id)?.pin);
    let pos = sock_pin.unwrap_or((lp + rp) * 0.5);
    let Some(merged) = scene.points.merge(left, right, pos) else {
        return;
    };
    for rope in scene.grabs.iter_mut().filter_map(|g| g.rope.as_mut()) {
        if rope.tail() == left || rope.tail() == right {
            rope.retarget_tail(merged);
        }
    }
    let Some((l, r)) = scene.candy.finish_merge(merged, CANDY_RADIUS) else {
        return;
    };

    // The merged candy keeps the left half's carrier when both had one
    let bubble = l.bubble.or(r.bubble);
    for b in &mut scene.bubbles {
        if matches!(b.state, BubbleState::Carrying(_)) && [l.bubble, r.bubble].contains(&Some(b.id)) {
            b.state = if Some(b.id) == bubble {
                BubbleState::Carrying(Side::Whole)
            } else {
                BubbleState::Popped
            };
        }
    }
    let rocket = l.rocket.or(r.rocket);
    for rk in &mut scene.rockets {
        if let RocketState::Flying { fuel, .. } = rk.state {
            if [l.rocket, r.rocket].contains(&Some(rk.id)) {
                rk.state = if Some(rk.id) == rocket {
                    RocketState::Flying {
                        side: Side::Whole,
                        fuel,
                    }
                } else {
                    RocketState::Spent
                };
            }
        }
    }
    let socked = [(Side::Left, &l), (Side::Right, &r)]
        .into_iter()
        .find(|(_, half)| half.in_sock)
        .map(|(side, half)| (side, half.entry_speed));
    if let Some(candy) = scene.candy.get_mut(Side::Whole) {
        candy.bubble = bubble;
        candy.rocket = rocket;
        if let Some((_, speed)) = socked {
            candy.in_sock = true;
            candy.entry_speed = speed;
        }
    }
    if let Some((side, _)) = socked {
        scene.timers.retarget_teleport(side, Side::Whole);
    }
    if let Some(p) = scene.points.get_mut(merged) {
        p.disable_gravity = rocket.is_some();
        if let Some(pin) = sock_pin.filter(|_| socked.is_some()) {
            p.teleport(pin);
            p.pin = Some(pin);
        }
    }

    log::debug!("Candy halves merged at {:?}", pos);
    scene.play(SoundEffect::CandyLink);
    scene.emit(SimEvent::CandyMerged { pos });
}

/// Expire timed stars and collect at most one star per frame
fn collect_stars(scene: &mut Scene, dt: f32) {
    let mut expired = Vec::new();
    for star in &mut scene.stars {
        if star.tick(dt) {
            expired.push(star.id);
        }
    }
    for id in expired {
        scene.star_fades.insert(id, STAR_FADE_TIME);
        scene.emit(SimEvent::StarExpired { star: id });
    }

    let hit = pieces(scene)
        .into_iter()
        .filter(|p| !p.in_sock)
        .filter_map(|p| Some((scene.points.pos(p.point)?, p.radius)))
        .find_map(|(pos, radius)| scene.stars.iter().position(|s| s.touches(pos, radius)));
    let Some(si) = hit else {
        return;
    };
    let star = &mut scene.stars[si];
    star.collected = true;
    let id = star.id;
    scene.stars_collected += 1;
    let total = scene.stars_collected;
    scene.star_fades.insert(id, STAR_FADE_TIME);
    scene.play(SoundEffect::Star(total.min(u8::MAX as u32) as u8));
    scene.emit(SimEvent::StarCollected { star: id, total });
    scene.emit(SimEvent::Animation(AnimationCue::Excited));
    scene.emit(SimEvent::Animation(AnimationCue::StarFade { star: id }));
}

/// Capture candy in free bubbles and float bubbled candy upward
fn update_bubbles(scene: &mut Scene, dt: f32) {
    for piece in pieces(scene).into_iter().filter(|p| !p.in_sock) {
        let Some(pos) = scene.points.pos(piece.point) else {
            continue;
        };
        let Some(bi) = scene
            .bubbles
            .iter()
            .position(|b| b.captures(pos, piece.radius))
        else {
            continue;
        };
        let old = scene.candy.get(piece.side).and_then(|c| c.bubble);
        if let Some(oi) = old.and_then(|id| scene.bubbles.iter().position(|b| b.id == id)) {
            scene.pop_bubble(oi);
        }
        let bubble = &mut scene.bubbles[bi];
        bubble.state = BubbleState::Carrying(piece.side);
        let id = bubble.id;
        if let Some(candy) = scene.candy.get_mut(piece.side) {
            candy.bubble = Some(id);
        }
        scene.play(SoundEffect::BubbleCapture);
    }

    let gravity = scene.gravity();
    for bubble in &mut scene.bubbles {
        let BubbleState::Carrying(side) = bubble.state else {
            continue;
        };
        let Some(point) = scene.candy.point_of(side) else {
            continue;
        };
        if let Some(p) = scene.points.get_mut(point) {
            p.apply_impulse(buoyancy_impulse(p.v, gravity, dt), dt);
            bubble.pos = p.pos;
        }
    }
}

fn update_hazards(scene: &mut Scene, dt: f32) {
    update_spikes(scene, dt);
    update_bouncers(scene, dt);
    update_pumps(scene, dt);
    for razor in &mut scene.razors {
        razor.update(dt);
    }
    scene.cut_with_razors();
    update_socks(scene, dt);
    update_rockets(scene, dt);
}

/// Spikes are fatal on contact
fn update_spikes(scene: &mut Scene, dt: f32) {
    let mut switched_on = false;
    for spikes in &mut scene.spikes {
        if let Some(cycle) = &mut spikes.electro {
            switched_on |= cycle.update(dt);
        }
    }
    if switched_on {
        scene.play(SoundEffect::Electric);
    }

    let hits: Vec<Side> = pieces(scene)
        .into_iter()
        .filter(|p| !p.in_sock)
        .filter(|p| {
            scene
                .points
                .pos(p.point)
                .is_some_and(|pos| scene.spikes.iter().any(|s| s.hits(pos, p.radius)))
        })
        .map(|p| p.side)
        .collect();
    for side in hits {
        scene.destroy_candy(side, CandyLoss::Shattered);
    }
}

fn update_bouncers(scene: &mut Scene, dt: f32) {
    let mut bounces = 0;
    for bouncer in &mut scene.bouncers {
        bouncer.update(dt);
    }
    for piece in pieces(scene).into_iter().filter(|p| !p.in_sock) {
        for bouncer in &mut scene.bouncers {
            if let Some(point) = scene.points.get_mut(piece.point) {
                if bouncer.bounce(piece.side, point, piece.radius, dt) {
                    bounces += 1;
                }
            }
        }
    }
    for _ in 0..bounces {
        scene.play(SoundEffect::Bounce);
    }
}

fn update_pumps(scene: &mut Scene, dt: f32) {
    for pump in &mut scene.pumps {
        pump.update(dt);
    }
    for piece in pieces(scene).into_iter().filter(|p| !p.in_sock) {
        let Some(pos) = scene.points.pos(piece.point) else {
            continue;
        };
        let flow: Vec2 = scene.pumps.iter().filter_map(|p| p.flow_at(pos)).sum();
        if let Some(point) = scene.points.get_mut(piece.point) {
            point.apply_impulse(flow * dt, dt);
        }
    }
}

/// Candy falling into a sock comes out of its pair after a short delay
fn update_socks(scene: &mut Scene, dt: f32) {
    for piece in pieces(scene) {
        let Some(candy) = scene.candy.get_mut(piece.side) else {
            continue;
        };
        candy.sock_cooldown = (candy.sock_cooldown - dt).max(0.0);
        if candy.in_sock || candy.sock_cooldown > 0.0 {
            continue;
        }
        let Some(point) = scene.points.get(piece.point) else {
            continue;
        };
        let (pos, velocity) = (point.pos, point.v);
        let entry = scene.socks.iter().find_map(|sock| {
            if !sock.swallows(pos, velocity, piece.radius) {
                return None;
            }
            let pair = scene
                .socks
                .iter()
                .find(|s| s.group == sock.group && s.id != sock.id)?;
            Some((sock.id, sock.pos, pair.id))
        });
        let Some((sock_id, sock_pos, to_sock)) = entry else {
            continue;
        };
        enter_sock(scene, piece, velocity.length(), sock_id, sock_pos, to_sock);
    }
}

fn enter_sock(
    scene: &mut Scene,
    piece: Piece,
    speed: f32,
    sock_id: u32,
    sock_pos: Vec2,
    to_sock: u32,
) {
    scene.release_ropes(piece.point);
    release_carriers(scene, piece.side);
    if let Some(candy) = scene.candy.get_mut(piece.side) {
        candy.in_sock = true;
        candy.entry_speed = speed;
    }
    if let Some(p) = scene.points.get_mut(piece.point) {
        p.teleport(sock_pos);
        p.pin = Some(sock_pos);
    }
    scene.timers.call_object(
        TimerOwner::Sock(sock_id),
        DelayedAction::Teleport {
            side: piece.side,
            to_sock,
        },
        scene.settings.sock_teleport_delay,
    );
    log::debug!("Candy {:?} entered sock {}", piece.side, sock_id);
    scene.play(SoundEffect::Teleport);
}

/// Pop the bubble and drop the rocket carrying a piece
fn release_carriers(scene: &mut Scene, side: Side) {
    let Some(candy) = scene.candy.get_mut(side) else {
        return;
    };
    let (bubble, rocket, point) = (candy.bubble.take(), candy.rocket.take(), candy.point);
    if let Some(bi) = bubble.and_then(|id| scene.bubbles.iter().position(|b| b.id == id)) {
        scene.pop_bubble(bi);
    }
    if let Some(rk) = rocket.and_then(|id| scene.rockets.iter_mut().find(|r| r.id == id)) {
        rk.state = RocketState::Spent;
        if let Some(p) = scene.points.get_mut(point) {
            p.disable_gravity = false;
        }
    }
}

fn update_rockets(scene: &mut Scene, dt: f32) {
    for piece in pieces(scene).into_iter().filter(|p| !p.in_sock) {
        if scene.candy.get(piece.side).is_none_or(|c| c.rocket.is_some()) {
            continue;
        }
        let Some(pos) = scene.points.pos(piece.point) else {
            continue;
        };
        let Some(ri) = scene
            .rockets
            .iter()
            .position(|r| r.catches(pos, piece.radius))
        else {
            continue;
        };
        release_carriers(scene, piece.side);
        let rocket = &mut scene.rockets[ri];
        rocket.ignite(piece.side);
        let id = rocket.id;
        if let Some(candy) = scene.candy.get_mut(piece.side) {
            candy.rocket = Some(id);
        }
        if let Some(p) = scene.points.get_mut(piece.point) {
            p.disable_gravity = true;
        }
        scene.play(SoundEffect::Rocket);
    }

    for ri in 0..scene.rockets.len() {
        let Some(side) = scene.rockets[ri].carrying() else {
            continue;
        };
        let Some(point) = scene.candy.point_of(side) else {
            scene.rockets[ri].state = RocketState::Spent;
            continue;
        };
        let Some(p) = scene.points.get_mut(point) else {
            continue;
        };
        if scene.rockets[ri].propel(p, dt) {
            p.disable_gravity = false;
            if let Some(candy) = scene.candy.get_mut(side) {
                candy.rocket = None;
            }
        }
    }
}

/// Open the mouth when the candy is near; eat it when it arrives
fn update_target(scene: &mut Scene, dt: f32) {
    let target_pos = scene.target.pos;
    let open_radius = scene.settings.mouth_open_radius;
    let near = pieces(scene).into_iter().filter(|p| !p.in_sock).any(|p| {
        scene
            .points
            .pos(p.point)
            .is_some_and(|pos| pos.distance(target_pos) < open_radius)
    });

    if near {
        scene.target.close_timer = scene.settings.mouth_close_delay;
        if !scene.target.mouth_open {
            scene.target.mouth_open = true;
            scene.play(SoundEffect::MouthOpen);
            scene.emit(SimEvent::Animation(AnimationCue::MouthOpen));
        }
    } else if scene.target.mouth_open {
        scene.target.close_timer -= dt;
        if scene.target.close_timer <= 0.0 {
            scene.target.mouth_open = false;
            scene.play(SoundEffect::MouthClose);
            scene.emit(SimEvent::Animation(AnimationCue::MouthClose));
        }
    }

    if !scene.candy.is_whole() || scene.candy.get(Side::Whole).is_some_and(|c| c.in_sock) {
        return;
    }
    let target = scene.target.bounds();
    if piece_bounds(scene, Side::Whole).is_some_and(|b| b.overlaps(&target)) {
        scene.win();
    }
}

/// Un-roped candy past the top or bottom bound is lost
fn check_offscreen(scene: &mut Scene) {
    let bottom = scene.height + scene.settings.offscreen_bottom_margin;
    let top = -scene.settings.offscreen_top_margin;
    let lost: Vec<Side> = pieces(scene)
        .into_iter()
        .filter(|p| !p.in_sock && !scene.is_held(p.point))
        .filter(|p| {
            scene
                .points
                .pos(p.point)
                .is_some_and(|pos| pos.y > bottom || pos.y < top)
        })
        .map(|p| p.side)
        .collect();
    for side in lost {
        scene.destroy_candy(side, CandyLoss::OffScreen);
    }
}

/// Lose when the candy drifts with nothing holding it for too long
fn check_rope_free(scene: &mut Scene, dt: f32) {
    let Some(limit) = scene.settings.rope_free_timeout else {
        return;
    };
    let mut timed_out = false;
    for piece in pieces(scene) {
        let held = scene.is_held(piece.point);
        let Some(candy) = scene.candy.get_mut(piece.side) else {
            continue;
        };
        let free = !held && !candy.in_sock && candy.bubble.is_none() && candy.rocket.is_none();
        candy.rope_free_time = if free { candy.rope_free_time + dt } else { 0.0 };
        timed_out |= candy.rope_free_time > limit;
    }
    if timed_out {
        log::debug!("Candy rope-free for more than {:.1}s", limit);
        scene.lose();
    }
}

/// Click-to-cut: highlight the rope under the cursor unless a control is there
fn update_highlight(scene: &mut Scene) {
    let highlight = match scene.last_touch {
        Some(p) if scene.settings.click_to_cut && !scene.active_element_at(p) => {
            nearest_segment(scene, p, CLICK_TO_CUT_RADIUS)
        }
        _ => None,
    };
    scene.highlight = highlight;
    for (gi, grab) in scene.grabs.iter_mut().enumerate() {
        if let Some(rope) = &mut grab.rope {
            rope.highlighted = highlight.is_some_and(|(h, _)| h == gi);
        }
    }
}
