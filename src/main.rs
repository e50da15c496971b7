/*
 * SPDX-License-Identifier: GPL-3.0-or-later
 * More licensing information can be found in the project LICENSE file
 */
fn main() {
    hup_sv::run();
}
